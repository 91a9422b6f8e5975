use super::{AppEvent, Control, HttpCompletion, HttpRequest, MonitorContext, UserCommand};
use crate::config::MonitorConfig;
use crate::connection::WsTransport;
use crate::render::TracingSink;
use crate::session::AuthClient;
use crate::timer::{Now, TokioScheduler};
use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Run the client until the user quits
pub async fn run(config: MonitorConfig) -> Result<()> {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<AppEvent>();

    let transport = WsTransport::new(config.feed.ws_url(), events_tx.clone());
    let timers = TokioScheduler::new(events_tx.clone());
    let auth = AuthClient::new(&config.feed)?;

    let mut ctx = MonitorContext::new(&config, transport, timers, TracingSink, Now::current());

    spawn_command_reader(events_tx.clone());

    ctx.start(Now::current());
    spawn_requests(&auth, ctx.take_requests(), &events_tx);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let event = tokio::select! {
            event = events_rx.recv() => match event {
                Some(event) => event,
                None => {
                    ctx.teardown();
                    break;
                }
            },
            _ = &mut ctrl_c => {
                info!("Interrupted");
                AppEvent::Command(UserCommand::Quit)
            }
        };

        if ctx.handle(event, Now::current()) == Control::Quit {
            break;
        }
        spawn_requests(&auth, ctx.take_requests(), &events_tx);
    }

    info!("Presence monitor stopped");
    Ok(())
}

/// Perform queued HTTP calls off the loop; completions come back as events
fn spawn_requests(
    auth: &AuthClient,
    requests: Vec<HttpRequest>,
    events: &mpsc::UnboundedSender<AppEvent>,
) {
    for request in requests {
        let auth = auth.clone();
        let events = events.clone();
        tokio::spawn(async move {
            let completion = match request {
                HttpRequest::Login(login) => HttpCompletion::Login {
                    stage: login.stage(),
                    result: auth.login(&login).await.map_err(|e| format!("{:#}", e)),
                },
                HttpRequest::Logout => {
                    HttpCompletion::Logout(auth.logout().await.map_err(|e| format!("{:#}", e)))
                }
                HttpRequest::BuildInfo => HttpCompletion::BuildInfo(
                    auth.build_info().await.map_err(|e| format!("{:#}", e)),
                ),
            };
            let _ = events.send(AppEvent::Http(completion));
        });
    }
}

/// Read commands from stdin, one per line
fn spawn_command_reader(events: mpsc::UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<UserCommand>() {
                        Ok(command) => {
                            if events.send(AppEvent::Command(command)).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "Ignoring input"),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });
}
