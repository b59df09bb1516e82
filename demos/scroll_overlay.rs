//! A scroll overlay driven from stdin.
//!
//! Type one trigger per line in key notation (`<Leader>s`, `l`, `h`, `q`,
//! `<Esc>`). The overlay enters on `<Leader>s`, turns `h`/`l` into scroll
//! commands, and leaves on `q`, `<Esc>` or after two idle seconds.
//!
//! ```sh
//! RUST_LOG=keylayer=trace cargo run --example scroll_overlay
//! ```

use keylayer::testing::{TestHost, TestSession};
use keylayer::widgets::{BindingHelp, Indicator};
use keylayer::{
    BindingRegistry, HostEvent, Mapping, OverlayDecl, Scope, TokioScheduler, Trigger,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const SCROLL: &str = r#"{
    "name": "scroll",
    "entrance": [
        { "mode": "n", "trigger": "<Leader>s", "options": { "desc": "scroll mode" } }
    ],
    "overlay": [
        { "mode": "n", "trigger": "l", "action": "scroll-right" },
        { "mode": "n", "trigger": "h", "action": "scroll-left" },
        { "mode": "n", "trigger": "j", "action": "<Pass>" }
    ],
    "departure": [
        { "mode": "n", "trigger": "q", "options": { "desc": "done" } },
        { "mode": "n", "trigger": "<Esc>" }
    ],
    "config": { "timeout_ms": 2000, "install_scope": "global" }
}"#;

type Session = TestSession<TokioScheduler>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keylayer=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (scheduler, mut ticks) = TokioScheduler::new();
    let mut host = TestHost::with_scheduler(scheduler);
    for (keys, command) in [("l", "move-right"), ("h", "move-left"), ("j", "move-down")] {
        host.set(Scope::Global, &Trigger::new("n", keys)?, Mapping::command(command))?;
    }
    let mut session = Session::with_host(host);

    let decl = OverlayDecl::from_json(SCROLL)?;
    let config = decl
        .config
        .clone()
        .on_enter(|cx| {
            if let Err(err) = cx.options().view("cursorline", true) {
                tracing::warn!(%err, "cannot highlight cursor line");
            }
        })
        .on_exit(|cx| tracing::info!(overlay = %cx.overlay(), "scroll overlay closed"));
    let id = session.controller_mut().create(decl.with_config(config))?;
    session.controller_mut().attach(id)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut seen = 0;
    print_status(&session, &mut seen);
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let keys = line.trim();
                if keys.is_empty() {
                    continue;
                }
                match Trigger::new("n", keys) {
                    Ok(trigger) => session.press_trigger(&trigger),
                    Err(err) => {
                        eprintln!("{err}");
                        continue;
                    }
                }
            }
            Some(handle) = ticks.recv() => {
                session.controller_mut().handle(HostEvent::TimerFired(handle))?;
            }
        }
        print_status(&session, &mut seen);
    }

    session.controller_mut().shutdown();
    Ok(())
}

fn print_status(session: &Session, seen: &mut usize) {
    for command in &session.host().executed()[*seen..] {
        println!("  ran {command}");
    }
    *seen = session.host().executed().len();

    let active = session.controller().active();
    let badge = Indicator::new(active.as_ref())
        .label()
        .unwrap_or_else(|| "-- NORMAL --".to_string());
    let hint = active
        .as_ref()
        .and_then(|a| session.controller().bindings(a.id))
        .map(|table| BindingHelp::new(table).hide_entrance().short_line(60).to_string())
        .unwrap_or_default();
    println!("{badge} {hint}");
}
