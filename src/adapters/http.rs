//! HTTP endpoints.
//!
//! | Route        | Method | Behaviour                                      |
//! |--------------|--------|------------------------------------------------|
//! | `/data`      | GET    | last rendered status JSON                      |
//! | `/reset`     | POST   | form body → ingress, HTML confirmation         |
//!
//! Handlers run in the httpd task and never touch the ledger.  `/data`
//! serves the JSON the main loop last stored with [`store_status`];
//! `/reset` copies the form body into the ingress channel and always
//! answers with the confirmation page, whatever the body held.

use std::sync::{Mutex, PoisonError};

use crate::app::commands::MAX_COMMAND_LEN;

/// Served before the first tick has rendered anything.
pub const EMPTY_STATUS: &str = "{}";

static STATUS_JSON: Mutex<String> = Mutex::new(String::new());

/// Replace the cached status document.  Main loop only.
pub fn store_status(json: String) {
    *STATUS_JSON.lock().unwrap_or_else(PoisonError::into_inner) = json;
}

pub fn current_status() -> String {
    let cached = STATUS_JSON.lock().unwrap_or_else(PoisonError::into_inner);
    if cached.is_empty() {
        EMPTY_STATUS.to_owned()
    } else {
        cached.clone()
    }
}

/// Bytes read from a `/reset` body.  One past the command limit so an
/// oversized body is seen as oversized rather than silently truncated.
pub const RESET_BODY_LIMIT: usize = MAX_COMMAND_LEN + 1;

/// Fill `buf` from `read` until EOF or the buffer is full.
pub fn read_body<E>(
    buf: &mut [u8],
    mut read: impl FnMut(&mut [u8]) -> Result<usize, E>,
) -> Result<usize, E> {
    let mut len = 0;
    while len < buf.len() {
        let n = read(&mut buf[len..])?;
        if n == 0 {
            break;
        }
        len += n;
    }
    Ok(len)
}

#[cfg(target_os = "espidf")]
pub struct HttpPortal {
    _server: esp_idf_svc::http::server::EspHttpServer<'static>,
}

#[cfg(target_os = "espidf")]
impl HttpPortal {
    pub fn start() -> anyhow::Result<Self> {
        use esp_idf_svc::http::Method;
        use esp_idf_svc::http::server::{Configuration, EspHttpServer};
        use esp_idf_svc::io::{Read, Write};
        use log::info;

        use super::ingress;
        use crate::app::commands::CommandSource;
        use crate::app::status::RESET_CONFIRMATION_HTML;

        let mut server = EspHttpServer::new(&Configuration::default())?;

        server.fn_handler("/data", Method::Get, |req| -> anyhow::Result<()> {
            let body = current_status();
            let mut resp = req.into_response(200, None, &[("Content-Type", "application/json")])?;
            resp.write_all(body.as_bytes())?;
            Ok(())
        })?;

        server.fn_handler("/reset", Method::Post, |mut req| -> anyhow::Result<()> {
            let mut buf = [0u8; RESET_BODY_LIMIT];
            let len = read_body(&mut buf, |chunk| req.read(chunk))?;
            ingress::submit(CommandSource::WebForm, &buf[..len]);

            let mut resp = req.into_response(200, None, &[("Content-Type", "text/html")])?;
            resp.write_all(RESET_CONFIRMATION_HTML.as_bytes())?;
            Ok(())
        })?;

        info!("HTTP: serving /data and /reset");
        Ok(Self { _server: server })
    }
}
