use std::io::{self, Read, Write};

use anyhow::Context;

use supplyerp_cli::{ReplayConfig, Scenario, run_with};

fn read_scenario(arg: Option<String>) -> anyhow::Result<Scenario> {
    let raw = match arg.as_deref() {
        None | Some("-") => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("reading scenario from stdin")?;
            buf
        }
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario file {path}"))?,
    };
    Scenario::from_json(&raw).context("parsing scenario")
}

fn main() -> anyhow::Result<()> {
    let config = ReplayConfig::from_env()?;
    supplyerp_observability::init_with(config.log_format);

    let scenario = read_scenario(std::env::args().nth(1))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let replay = run_with(&scenario, config.default_policy, |envelope| {
        serde_json::to_writer(&mut out, envelope)?;
        writeln!(out)
    })
    .context("replaying scenario")?;

    serde_json::to_writer_pretty(&mut out, &replay.summary())?;
    writeln!(out)?;
    Ok(())
}
