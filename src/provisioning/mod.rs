//! HTTP provisioning page served while the configuration access point is up.
//!
//! `GET /` returns a form for the network to join. `POST /provision` takes
//! the form submission (`application/x-www-form-urlencoded`) or the same
//! fields as JSON:
//!
//! ```json
//! { "ssid": "HomeNet", "password": "secret", "security": 2 }
//! ```
//!
//! `password` defaults to empty and `security` to WPA-PSK (2). Accepted
//! credentials are handed to the node as a [`ProvisionResult`] over a
//! channel. Uses `tiny_http`, which works on both host and ESP32.

use crate::config::{ConfigError, Credentials, SecurityType, CHANNEL_ALL};
use crate::controller::ProvisionResult;
use log::{error, info, warn};
use serde::Deserialize;
use std::io::Read;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Largest request body accepted.
const MAX_BODY_LEN: u64 = 1024;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Body of `POST /provision`.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ProvisionRequest {
    pub ssid: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_security")]
    #[zeroize(skip)]
    pub security: u8,
}

fn default_security() -> u8 {
    SecurityType::WpaPsk.code()
}

impl ProvisionRequest {
    /// Validate into credentials that scan every channel.
    pub fn to_credentials(&self) -> Result<Credentials, ConfigError> {
        let security = SecurityType::from_code(self.security)?;
        Credentials::new(
            self.ssid.clone(),
            self.password.clone(),
            security,
            CHANNEL_ALL,
        )
    }
}

/// Provisioning HTTP server.
///
/// Runs in a background thread. Drop it to stop the server.
pub struct ProvisioningServer {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    results: Receiver<ProvisionResult>,
    port: u16,
}

impl ProvisioningServer {
    /// Start the server.
    ///
    /// `bind_addr` of `None` listens on all interfaces. Port 0 picks a free
    /// port, see [`ProvisioningServer::port`].
    pub fn start(
        bind_addr: Option<IpAddr>,
        port: u16,
        access_point: &str,
    ) -> Result<Self, std::io::Error> {
        let addr = match bind_addr {
            Some(ip) => format!("{}:{}", ip, port),
            None => format!("0.0.0.0:{}", port),
        };

        let server = Server::http(&addr)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::AddrInUse, format!("{}", e)))?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|a| a.port())
            .unwrap_or(port);

        info!("Provisioning page listening on port {}", port);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let (tx, results) = mpsc::channel();
        let page = instructions_page(access_point);

        let handle = thread::spawn(move || {
            Self::run_server(server, tx, page, shutdown_clone);
        });

        Ok(Self {
            handle: Some(handle),
            shutdown,
            results,
            port,
        })
    }

    /// Port the server is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Next submitted result, if any.
    pub fn try_result(&self) -> Option<ProvisionResult> {
        match self.results.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        }
    }

    fn run_server(
        server: Server,
        results: Sender<ProvisionResult>,
        page: String,
        shutdown: Arc<AtomicBool>,
    ) {
        let html = Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..])
            .expect("static header");

        loop {
            if shutdown.load(Ordering::Acquire) {
                info!("Provisioning server shutting down");
                break;
            }

            match server.recv_timeout(Duration::from_millis(100)) {
                Ok(Some(request)) => {
                    let is_page = request.method() == &Method::Get && request.url() == "/";
                    let is_provision =
                        request.method() == &Method::Post && request.url() == "/provision";

                    let sent = if is_provision {
                        Self::handle_provision(request, &results)
                    } else if is_page {
                        request.respond(
                            Response::from_string(page.clone())
                                .with_header(html.clone())
                                .with_status_code(200),
                        )
                    } else {
                        request.respond(Response::from_string("Not Found").with_status_code(404))
                    };
                    if let Err(e) = sent {
                        warn!("Failed to send response: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Server error: {}", e);
                    break;
                }
            }
        }
    }

    fn handle_provision(
        mut request: Request,
        results: &Sender<ProvisionResult>,
    ) -> Result<(), std::io::Error> {
        let is_form = request.headers().iter().any(|h| {
            h.field.equiv("Content-Type") && h.value.as_str().starts_with(FORM_CONTENT_TYPE)
        });

        let mut body = String::new();
        if let Err(e) = request
            .as_reader()
            .take(MAX_BODY_LEN)
            .read_to_string(&mut body)
        {
            warn!("Failed to read provisioning request: {}", e);
            return request.respond(Response::from_string("Bad Request").with_status_code(400));
        }

        let parsed = parse_request(&body, is_form)
            .and_then(|req| req.to_credentials().map_err(|e| e.to_string()));
        body.zeroize();

        match parsed {
            Ok(credentials) => {
                info!("Received credentials for '{}'", credentials.ssid);
                if results
                    .send(ProvisionResult::Success(credentials))
                    .is_err()
                {
                    warn!("Provisioning result dropped, node not listening");
                }
                request.respond(Response::from_string("Credentials accepted").with_status_code(200))
            }
            Err(reason) => {
                warn!("Rejected provisioning request: {}", reason);
                request.respond(Response::from_string(reason).with_status_code(400))
            }
        }
    }

    /// Stop the server.
    ///
    /// May take up to 100ms due to the polling interval.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProvisioningServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decode a `POST /provision` body, form encoded or JSON.
fn parse_request(body: &str, is_form: bool) -> Result<ProvisionRequest, String> {
    if is_form {
        serde_urlencoded::from_str(body).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(body).map_err(|e| e.to_string())
    }
}

fn instructions_page(access_point: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><title>Sensor node setup</title></head><body>\n\
         <h1>Sensor node setup</h1>\n\
         <p>You are connected to <b>{}</b>. Enter the network the node should join.</p>\n\
         <form method=\"post\" action=\"/provision\">\n\
         <p><label>SSID <input name=\"ssid\" maxlength=\"32\" required></label></p>\n\
         <p><label>Password <input name=\"password\" type=\"password\" maxlength=\"64\"></label></p>\n\
         <p><label>Security <select name=\"security\">\n\
         <option value=\"1\">Open</option>\n\
         <option value=\"2\" selected>WPA-PSK</option>\n\
         <option value=\"3\">WEP</option>\n\
         <option value=\"4\">WPA/WPA2 Enterprise</option>\n\
         </select></label></p>\n\
         <p><button type=\"submit\">Connect</button></p>\n\
         </form>\n\
         </body></html>\n",
        access_point
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{Ipv4Addr, TcpStream};
    use std::time::Instant;

    fn start() -> ProvisioningServer {
        ProvisioningServer::start(Some(IpAddr::V4(Ipv4Addr::LOCALHOST)), 0, "TestAP").unwrap()
    }

    fn http(port: u16, request: &str) -> String {
        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream.write_all(request.as_bytes()).unwrap();
        let mut response = String::new();
        let _ = stream.read_to_string(&mut response);
        response
    }

    fn post_as(port: u16, content_type: &str, body: &str) -> String {
        http(
            port,
            &format!(
                "POST /provision HTTP/1.1\r\nHost: localhost\r\nContent-Type: {}\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                content_type,
                body.len(),
                body
            ),
        )
    }

    fn post(port: u16, body: &str) -> String {
        post_as(port, "application/json", body)
    }

    fn wait_result(server: &ProvisioningServer) -> Option<ProvisionResult> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some(result) = server.try_result() {
                return Some(result);
            }
            thread::sleep(Duration::from_millis(10));
        }
        None
    }

    #[test]
    fn test_request_to_credentials() {
        let req: ProvisionRequest =
            serde_json::from_str(r#"{"ssid":"HomeNet","password":"pw","security":3}"#).unwrap();
        let creds = req.to_credentials().unwrap();
        assert_eq!(creds.ssid, "HomeNet");
        assert_eq!(creds.security, SecurityType::Wep);
        assert_eq!(creds.channel, CHANNEL_ALL);
    }

    #[test]
    fn test_request_defaults() {
        let req: ProvisionRequest = serde_json::from_str(r#"{"ssid":"HomeNet"}"#).unwrap();
        assert_eq!(req.password, "");
        assert_eq!(req.security, 2);
    }

    #[test]
    fn test_request_unknown_security() {
        let req: ProvisionRequest =
            serde_json::from_str(r#"{"ssid":"HomeNet","security":9}"#).unwrap();
        assert_eq!(req.to_credentials(), Err(ConfigError::UnknownSecurity(9)));
    }

    #[test]
    fn test_form_request_to_credentials() {
        let req = parse_request("ssid=Home+Net&password=p%40ss&security=1", true).unwrap();
        assert_eq!(req.ssid, "Home Net");
        assert_eq!(req.password, "p@ss");
        assert_eq!(req.security, 1);
        assert!(parse_request("ssid=Home+Net", false).is_err());
    }

    #[test]
    fn test_serves_form() {
        let server = start();
        let response = http(
            server.port(),
            "GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("TestAP"));
        assert!(response.contains(r#"<form method="post" action="/provision">"#));
        assert!(response.contains(r#"name="ssid""#));
        assert!(response.contains(r#"name="security""#));
    }

    #[test]
    fn test_form_submission_delivers_credentials() {
        let server = start();
        let response = post_as(
            server.port(),
            "application/x-www-form-urlencoded",
            "ssid=Office+2&password=s%26cret&security=2",
        );
        assert!(response.starts_with("HTTP/1.1 200"));

        match wait_result(&server) {
            Some(ProvisionResult::Success(creds)) => {
                assert_eq!(creds.ssid, "Office 2");
                assert_eq!(creds.password, "s&cret");
                assert_eq!(creds.security, SecurityType::WpaPsk);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_path_is_404() {
        let server = start();
        let response = http(
            server.port(),
            "GET /stats HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 404"));
    }

    #[test]
    fn test_provision_delivers_credentials() {
        let server = start();
        let response = post(
            server.port(),
            r#"{"ssid":"HomeNet","password":"secret","security":2}"#,
        );
        assert!(response.starts_with("HTTP/1.1 200"));

        match wait_result(&server) {
            Some(ProvisionResult::Success(creds)) => {
                assert_eq!(creds.ssid, "HomeNet");
                assert_eq!(creds.password, "secret");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_body_is_400() {
        let server = start();
        let response = post(server.port(), "ssid=HomeNet");
        assert!(response.starts_with("HTTP/1.1 400"));
        assert!(server.try_result().is_none());
    }

    #[test]
    fn test_invalid_ssid_is_400() {
        let server = start();
        let response = post(server.port(), r#"{"ssid":""}"#);
        assert!(response.starts_with("HTTP/1.1 400"));
        assert!(server.try_result().is_none());
    }
}
