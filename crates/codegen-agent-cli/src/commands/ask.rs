use anyhow::{anyhow, Result};
use bat::PrettyPrinter;
use console::style;

use crate::setup::{build_agent, load_settings, Overrides};
use codegen_agent::agent::RunResult;

pub async fn execute(overrides: &Overrides, message: &str, json: bool) -> Result<()> {
    let settings = load_settings(overrides)?;
    let mut agent = build_agent(&settings)?;

    let result = agent.run(message).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result)?;
    }
    Ok(())
}

pub fn print_result(result: &RunResult) -> Result<()> {
    for record in &result.tool_call_log {
        let status = match &record.result {
            Ok(_) => style("ok".to_string()).green(),
            Err(e) => style(e.to_string()).red(),
        };
        println!(
            "{} {} {}",
            style("tool").dim(),
            style(&record.name).cyan(),
            status
        );
    }

    if result.success {
        render(&result.final_response)?;
    } else {
        println!("{}", style(&result.final_response).yellow());
    }
    println!(
        "{}",
        style(format!("({} iterations)", result.iterations)).dim()
    );
    Ok(())
}

/// Answers usually carry generated code, print them as highlighted markdown
fn render(content: &str) -> Result<()> {
    PrettyPrinter::new()
        .input_from_bytes(content.as_bytes())
        .language("markdown")
        .print()
        .map_err(|e| anyhow!("Failed to render response: {}", e))?;
    println!();
    Ok(())
}
