//! One-shot loopback listener for the interactive OAuth redirect.
//!
//! Serves exactly one authorization redirect: requests to other paths get
//! a 404 and the listener keeps waiting; a request to the configured path
//! without a `code` query parameter gets a 400 and fails the flow. The
//! listener is dropped only after the response has been written in full,
//! so the browser always sees the confirmation page.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

use crate::error::{AuthError, Error};

/// How long to wait for the browser redirect.
const REDIRECT_DEADLINE: Duration = Duration::from_secs(5 * 60);

const SUCCESS_PAGE: &str = "Authorization successful! You can close this tab.";
const NO_CODE_PAGE: &str = "authorization failed: no code received";

/// Bind the loopback listener on the configured port.
pub(super) async fn bind(port: u16) -> Result<TcpListener, Error> {
    TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|err| AuthError::Listener(err.to_string()).into())
}

/// Wait for the authorization redirect and return the `code` parameter.
///
/// Bounded by a five-minute deadline; the caller is expected to have
/// pointed the user's browser at the authorization URL already.
pub(super) async fn wait_for_code(listener: TcpListener, path: &str) -> Result<String, Error> {
    match timeout(REDIRECT_DEADLINE, accept_redirect(listener, path)).await {
        Ok(result) => result,
        Err(_) => Err(AuthError::RedirectTimeout.into()),
    }
}

async fn accept_redirect(listener: TcpListener, path: &str) -> Result<String, Error> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|err| AuthError::Listener(err.to_string()))?;
        debug!(%peer, "redirect connection accepted");

        match serve_connection(stream, path).await? {
            Redirect::Code(code) => return Ok(code),
            Redirect::NoCode => return Err(AuthError::NoAuthCode.into()),
            Redirect::WrongPath => continue,
        }
    }
}

enum Redirect {
    Code(String),
    NoCode,
    WrongPath,
}

async fn serve_connection(stream: TcpStream, path: &str) -> Result<Redirect, Error> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .await
        .map_err(|err| AuthError::Listener(err.to_string()))?;

    let target = request_line.split_whitespace().nth(1).unwrap_or("/");
    let (request_path, code) = parse_target(target);

    let mut stream = reader.into_inner();
    let outcome = if request_path != path {
        respond(&mut stream, "404 Not Found", "not found").await?;
        Redirect::WrongPath
    } else {
        match code {
            Some(code) => {
                respond(&mut stream, "200 OK", SUCCESS_PAGE).await?;
                Redirect::Code(code)
            }
            None => {
                respond(&mut stream, "400 Bad Request", NO_CODE_PAGE).await?;
                Redirect::NoCode
            }
        }
    };

    Ok(outcome)
}

/// Split a request target into its path and the `code` query parameter.
fn parse_target(target: &str) -> (String, Option<String>) {
    // Resolve against a dummy base; the target is origin-form.
    let Ok(url) = Url::parse(&format!("http://localhost{target}")) else {
        return (target.to_string(), None);
    };

    let code = url
        .query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty());

    (url.path().to_string(), code)
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) -> Result<(), Error> {
    let response = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    );

    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|err| AuthError::Listener(err.to_string()))?;
    if let Err(err) = stream.shutdown().await {
        warn!(error = %err, "redirect connection shutdown failed");
    }

    Ok(())
}
