use console::Style;
use tilesmith::{descriptor::OperationDescriptor, emitter::emit, validator::validate};

pub fn handle_show_key(key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let descriptor = OperationDescriptor::from_key(key)?;
    println!("{}", serde_json::to_string_pretty(&descriptor)?);

    let emission = emit(&descriptor);
    println!("\ntemplate: {}", emission.request.template_name);
    for (parameter, argument) in &emission.request.template_arguments {
        println!("  {parameter} = {argument}");
    }

    match validate(&descriptor) {
        Ok(()) => println!("\n{}", Style::new().green().bold().apply_to("valid")),
        Err(error) => println!("\n{} {error}", Style::new().red().bold().apply_to("invalid:")),
    }
    Ok(())
}
