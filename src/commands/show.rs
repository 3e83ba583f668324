use anyhow::Result;

use memoflow::schema::FieldType;
use memoflow::{TaskModule, TaskRegistry};

use crate::cli::ShowArgs;

pub fn run(args: &ShowArgs, registry: &TaskRegistry) -> Result<()> {
    match &args.task_name {
        Some(name) => {
            let module = registry.resolve(name)?;
            print!("{}", describe(name, module.as_ref()));
        }
        None => {
            for identifier in registry.identifiers() {
                println!("{}", identifier);
            }
            println!("Total {} tasks found.", registry.len());
        }
    }
    Ok(())
}

fn describe(name: &str, module: &dyn TaskModule) -> String {
    let mut out = format!("{} (version {})\n", name, module.version());
    if !module.description().is_empty() {
        out.push_str(module.description());
        out.push('\n');
    }
    for (title, ty) in [
        ("Configuration", module.config_type()),
        ("Inputs", module.inputs_type()),
        ("Outputs", module.outputs_type()),
    ] {
        out.push_str(&format!("\n{}:\n", title));
        out.push_str(&fields(&ty));
    }
    out
}

fn fields(ty: &FieldType) -> String {
    let Some(schema) = ty.as_record() else {
        return format!("    {}\n", ty);
    };
    if schema.fields.is_empty() {
        return "    (none)\n".to_string();
    }
    schema
        .fields
        .iter()
        .map(|f| match &f.default {
            Some(default) => format!("    {}: {} = {}\n", f.name, f.ty, default),
            None => format!("    {}: {}\n", f.name, f.ty),
        })
        .collect()
}
