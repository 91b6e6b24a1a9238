//! Minimal tsu-bind example: a hyper server with a matchit router that binds
//! route parameters, queries and bodies, and renders JSON, SSE and downloads.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl 'http://localhost:3000/users/42?fields=name,email'
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice","roles":["admin"]}'
//!   curl -X POST http://localhost:3000/users \
//!        -d 'name=bob&roles=dev,ops'
//!   curl -N http://localhost:3000/events
//!   curl -OJ http://localhost:3000/report

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream;
use http::{Method, Request, Response, StatusCode};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};
use tsu_bind::render::Body;
use tsu_bind::{Binder, Error, ParserConfig, Render};

#[derive(Clone, Copy)]
enum Route {
    User,
    Users,
    Events,
    Report,
}

struct App {
    binder: Binder,
    routes: matchit::Router<Route>,
}

#[derive(Deserialize)]
struct UserPath {
    id: u64,
}

#[derive(Deserialize)]
struct UserQuery {
    #[serde(default)]
    fields: Vec<String>,
}

#[derive(Deserialize)]
struct NewUser {
    name: String,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Serialize)]
struct User {
    id: u64,
    name: String,
    roles: Vec<String>,
    fields: Vec<String>,
}

#[derive(Serialize)]
struct Tick {
    n: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut routes = matchit::Router::new();
    routes.insert("/users/{id}", Route::User)?;
    routes.insert("/users", Route::Users)?;
    routes.insert("/events", Route::Events)?;
    routes.insert("/report", Route::Report)?;

    let app = Arc::new(App { binder: Binder::new(ParserConfig::default()), routes });

    let addr: SocketAddr = "0.0.0.0:3000".parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    loop {
        tokio::select! {
            biased;

            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                return Ok(());
            }

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };
                let app = Arc::clone(&app);
                tokio::spawn(async move {
                    let svc = service_fn(move |req| {
                        let app = Arc::clone(&app);
                        async move { Ok::<_, Infallible>(dispatch(&app, req).await) }
                    });
                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), svc)
                        .await
                    {
                        error!(%peer, "connection error: {e}");
                    }
                });
            }
        }
    }
}

async fn dispatch(app: &App, req: Request<Incoming>) -> Response<Body> {
    let path = req.uri().path().to_owned();
    let Ok(matched) = app.routes.at(&path) else {
        return Render::new().status(StatusCode::NOT_FOUND).text("not found");
    };
    let (route, params) = (*matched.value, matched.params);

    let req = match tsu_bind::buffer(req).await {
        Ok(req) => req,
        Err(e) => return failure(&e),
    };
    let bind = app.binder.bind(&req).splitting(true);

    let result = match (route, req.method()) {
        (Route::User, &Method::GET) => bind.uri_params::<UserPath>(&params).and_then(|path| {
            let query: UserQuery = bind.query()?;
            Ok(Render::for_request(&req).json(&User {
                id: path.id,
                name: "alice".into(),
                roles: Vec::new(),
                fields: query.fields,
            }))
        }),
        (Route::Users, &Method::POST) => bind.must().body::<NewUser>().map(|user| {
            Render::new()
                .status(StatusCode::CREATED)
                .header("location", "/users/99")
                .json(&User { id: 99, name: user.name, roles: user.roles, fields: Vec::new() })
        }),
        (Route::Events, &Method::GET) => {
            let ticks = stream::iter((1..=3).map(|n| Tick { n }));
            Ok(Render::for_request(&req).event_stream(ticks))
        }
        (Route::Report, &Method::GET) => {
            Ok(Render::new().download("report.csv", "id,name\n42,alice\n"))
        }
        _ => Ok(Render::new().status(StatusCode::METHOD_NOT_ALLOWED).no_content()),
    };

    result.unwrap_or_else(|e| failure(&e))
}

fn failure(e: &Error) -> Response<Body> {
    Render::new().status(e.status()).text(e.to_string())
}
