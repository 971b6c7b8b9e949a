//! Tandem Runtime
//!
//! Minimal host that boots the bridge and runs one guest script.
//!
//! Usage: `tandem <script.js> [config.json]`

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tandem_core::BridgeConfig;
use tandem_script::{Bridge, HostFunction, Value};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    tracing::info!("Tandem v{}", tandem_core::VERSION);

    let mut args = std::env::args_os().skip(1);
    let Some(script) = args.next().map(PathBuf::from) else {
        bail!("usage: tandem <script.js> [config.json]");
    };
    let config = match args.next() {
        Some(path) => BridgeConfig::load(Path::new(&path))
            .with_context(|| format!("loading config {}", Path::new(&path).display()))?,
        None => BridgeConfig::default(),
    };

    let bridge = Bridge::new(config)?;
    bridge.set_global("print", &print_function().into())?;

    bridge
        .execute_file(&script)
        .with_context(|| format!("running {}", script.display()))?;

    let entry = bridge.global("main")?;
    match entry.as_guest() {
        Some(main) if main.is_callable() => {
            let result = bridge.invoke_guest(main, &[], None)?;
            tracing::info!(?result, "main returned");
        }
        _ => tracing::debug!("no main function defined"),
    }

    for (name, count) in bridge.stats() {
        tracing::debug!(%name, count, "bridge stat");
    }
    Ok(())
}

/// `print(...values)`: writes the guest's arguments to stdout.
fn print_function() -> HostFunction {
    HostFunction::new("print", |call| {
        let line: Vec<String> = call
            .args
            .iter()
            .map(|value| match value {
                Value::Text(text) => Ok(text.clone()),
                Value::Guest(guest) => call.bridge.describe(guest),
                other => Ok(render(other)),
            })
            .collect::<Result<_, _>>()?;
        println!("{}", line.join(" "));
        Ok(Value::Absent)
    })
}

fn render(value: &Value) -> String {
    match value {
        Value::Absent | Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(int) => int.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(text) => format!("{text:?}"),
        Value::Seq(items) => {
            let items: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Guest(guest) => format!("<{}>", guest.type_name()),
        Value::Host(host) => format!("<host {}>", host.type_name()),
    }
}
