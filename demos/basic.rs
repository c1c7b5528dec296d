//! Minimal vaultkit service: one protected route, one open route, built-ins.
//!
//! Run with:
//!   APP_NAME=demo BASIC_PASSWORD=secret RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/health
//!   curl -i http://localhost:3000/invoices/42                    # 401
//!   curl -i -u :secret -H 'X-Request-ID: abc' http://localhost:3000/invoices/42
//!   curl -i http://localhost:3000/boom                           # 500 + report

use vaultkit::{App, Config, Method, Request, Response, Router, Server, Unauthorized};

#[tokio::main]
async fn main() -> Result<(), vaultkit::Error> {
    vaultkit::telemetry::init()?;
    let config = Config::from_env()?;

    let router = Router::new()
        .on(Method::Get, "/invoices/{id}", get_invoice)
        .on_unprotected(Method::Get, "/status/{component}", status);

    Server::bind("0.0.0.0:3000")?.serve(App::new(config, router)).await
}

// GET /invoices/{id}, default passwords
async fn get_invoice(req: Request) -> Result<Response, Unauthorized> {
    req.protect(&[])?;
    let id = req.param("id").unwrap_or("unknown");

    let body = req
        .log()
        .log_block([("fn", "render_invoice"), ("invoice", id)], || {
            format!(r#"{{"id":"{id}","total":"12.00"}}"#)
        });

    Ok(Response::json(body).with_metadata("invoice", id))
}

// GET|HEAD /status/{component}, no auth
async fn status(req: Request) -> Response {
    let component = req.param("component").unwrap_or("all");
    req.log().count("status.checked", 1, Default::default());
    Response::text(format!("{component}: ok"))
}
