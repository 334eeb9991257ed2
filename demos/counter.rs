//! A shared-nothing WebSocket counter.
//!
//! Run with `cargo run --example counter`, then open http://127.0.0.1:8080.
//! Each browser tab gets its own counter; `+`/`-` frames change it and a
//! timer pushes the current value every second.

use std::time::Duration;

use tether::middleware::{LogRequests, Pipeline, RequireMethod, RescueCrashes};
use tether::realtime::{Connection, Message, WebSocketHandler, websocket};
use tether::{Method, Request, Response, Server, ServerConfig};
use tokio::task::JoinHandle;

const PAGE: &str = r#"<!doctype html>
<title>counter</title>
<p>count: <b id="n">0</b> <button id="dec">-</button> <button id="inc">+</button></p>
<script>
  const ws = new WebSocket(`ws://${location.host}/ws`);
  ws.onmessage = (e) => { document.getElementById("n").textContent = e.data; };
  document.getElementById("inc").onclick = () => ws.send("+");
  document.getElementById("dec").onclick = () => ws.send("-");
</script>
"#;

struct Counter;

struct Tick;

struct Session {
    count: i64,
    timer: JoinHandle<()>,
}

impl WebSocketHandler for Counter {
    type State = Session;
    type Event = Tick;

    async fn on_open(&self, conn: &Connection<Tick>) -> Session {
        tracing::info!(connection = conn.id(), "counter opened");
        let ticker = conn.clone();
        let timer = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                if ticker.dispatch(Tick).is_err() {
                    break;
                }
            }
        });
        Session { count: 0, timer }
    }

    async fn on_event(&self, conn: &Connection<Tick>, mut session: Session, message: Message<Tick>) -> Session {
        match message {
            Message::Text(text) if text == "+" => session.count += 1,
            Message::Text(text) if text == "-" => session.count -= 1,
            Message::Text(_) | Message::Bytes(_) => {}
            Message::Event(Tick) => {
                if let Err(e) = conn.send_text(session.count.to_string()).await {
                    tracing::debug!(connection = conn.id(), error = %e, "tick not delivered");
                }
            }
        }
        session
    }

    async fn on_close(&self, conn: &Connection<Tick>, session: Session) {
        session.timer.abort();
        tracing::info!(connection = conn.id(), count = session.count, "counter closed");
    }
}

async fn app(req: Request) -> Response {
    match req.path_segments().as_slice() {
        [] => Response::html(PAGE),
        ["ws"] => websocket(&req, Counter),
        _ => Response::not_found(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tether::logging::init();

    let handler = Pipeline::new()
        .wrap(LogRequests)
        .wrap(RescueCrashes)
        .wrap(RequireMethod::new([Method::Get]))
        .handler(app);

    let server = Server::with_config(ServerConfig::from_env()?).await?;
    println!("Listening on http://{}", server.local_addr());
    server.run(handler).await?;
    Ok(())
}
