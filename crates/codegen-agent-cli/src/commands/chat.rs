use anyhow::Result;
use cliclack::{input, spinner};
use console::style;

use crate::commands::ask::print_result;
use crate::setup::{build_agent, load_settings, Overrides};

pub async fn execute(overrides: &Overrides) -> Result<()> {
    let settings = load_settings(overrides)?;
    let mut agent = build_agent(&settings)?;

    println!(
        "{} {}",
        style("codegen-agent").bold().green(),
        style("- type \"/reset\" to clear the conversation, \"exit\" to end the session").dim()
    );
    println!(
        "{}",
        style(format!(
            "model {} with {} tools",
            settings.provider.model,
            agent.registry().len()
        ))
        .dim()
    );
    println!();

    loop {
        let message_text: String = input("Message:").placeholder("").multiline().interact()?;
        let trimmed = message_text.trim();

        if trimmed.eq_ignore_ascii_case("exit") {
            break;
        }
        if trimmed.eq_ignore_ascii_case("/reset") {
            agent.reset();
            println!("{}", style("conversation cleared").dim());
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }

        let spin = spinner();
        spin.start("awaiting reply");
        let outcome = agent.run(trimmed).await;
        spin.stop("");

        match outcome {
            Ok(result) => print_result(&result)?,
            Err(e) => {
                tracing::error!(error = %e, "agent run failed");
                println!("{} {}", style("error:").red().bold(), e);
            }
        }
        println!();
    }
    Ok(())
}
