//! Request handling.
//!
//! One invocation per proxied request: match the route, pick a target,
//! rewrite and forward the request, resolve the caller's clearance level,
//! mask the response, and emit the access-trace record. Failures surface as
//! generic gateway errors that never leak internal target URLs.

use std::convert::Infallible;
use std::sync::Arc;

use http::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST};
use http::{request, StatusCode, Uri};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::modules::masking::mask_document;
use crate::modules::token_cache::{
    cookie_value, form_value, json_path_string, TokenLocation, TokenPosition, TokenSide,
};
use crate::provider::UserInfoRoute;

use super::body::MaskingBody;
use super::forward::{empty_body, full_body, incoming_body, single_joining_slash, ProxyBody};
use super::manager::ProxyManager;
use super::trace::{self, TraceRecord};

/// Response header whose truthy value disables masking for that response.
pub const NO_MASKING_HEADER: &str = "No-Masking";

/// Entry point wired into the hyper connection service.
pub(super) async fn handle_request(
    manager: Arc<ProxyManager>,
    port: u16,
    client_ip: String,
    req: Request<Incoming>,
) -> Result<Response<ProxyBody>, Infallible> {
    Ok(proxy_request(manager, port, client_ip, req).await)
}

async fn proxy_request(
    manager: Arc<ProxyManager>,
    port: u16,
    client_ip: String,
    req: Request<Incoming>,
) -> Response<ProxyBody> {
    let Some(domain) = host_domain(req.headers().get(HOST)) else {
        return error_response(StatusCode::NOT_FOUND, "NO_ROUTE");
    };
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    // Behind another proxy the peer address is the proxy's; a forwarded
    // X-Real-IP keeps IP-hash stickiness on the true client.
    let client_ip = req
        .headers()
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .map_or(client_ip, ToString::to_string);

    let Some(resolved) = manager.resolve_request(port, &domain, &path, &client_ip) else {
        return error_response(StatusCode::NOT_FOUND, "NO_ROUTE");
    };
    let target = match &resolved.target {
        Ok(target) => target.clone(),
        Err(err) => {
            warn!(port, domain, path, error = %err, "no upstream target");
            return error_response(StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE");
        }
    };

    let token_position: Option<TokenPosition> = resolved
        .user_route
        .as_ref()
        .and_then(|uir| uir.token_position.parse().ok());

    let (parts, body) = req.into_parts();

    // A request-body token is the only case that forces buffering the
    // inbound body; everything else streams through.
    let needs_request_body = matches!(
        &token_position,
        Some(pos) if pos.side == TokenSide::Request && pos.location == TokenLocation::Body
    );
    let (outbound_body, request_body) = if needs_request_body {
        match body.collect().await {
            Ok(collected) => {
                let bytes = collected.to_bytes();
                (full_body(bytes.clone()), Some(bytes))
            }
            Err(err) => {
                debug!(port, domain, error = %err, "failed to read request body");
                return error_response(StatusCode::BAD_REQUEST, "BAD_REQUEST");
            }
        }
    } else {
        (incoming_body(body), None)
    };

    let mut token = String::new();
    if let Some(pos) = &token_position {
        if pos.side == TokenSide::Request {
            token = extract_request_token(pos, &parts, request_body.as_deref());
        }
    }

    let upstream_req =
        match build_upstream_request(&parts, &target, &resolved.route_path, &client_ip, outbound_body) {
            Ok(req) => req,
            Err(response) => return *response,
        };

    let upstream_resp = match manager.client().forward(upstream_req).await {
        Ok(resp) => resp,
        Err(err) => {
            error!(port, domain, path, target = %target, error = %err, "upstream request failed");
            return error_response(StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE");
        }
    };

    let (mut resp_parts, resp_body) = upstream_resp.into_parts();
    let bypass = is_truthy(resp_parts.headers.get(NO_MASKING_HEADER));
    let is_json = resp_parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.contains("application/json"));
    let identity_match = resolved.user_route.as_ref().map_or(false, |uir| {
        uir.path == path && uir.method.eq_ignore_ascii_case(method.as_str())
    });
    let token_from_response = matches!(
        &token_position,
        Some(pos) if pos.side == TokenSide::Response
    );

    let mut username = String::new();
    let mut masking_level: u8 = 0;

    let response = if identity_match || token_from_response {
        // Buffered path: the body itself carries the identity or the token.
        let bytes = match resp_body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                error!(port, domain, path, target = %target, error = %err, "upstream body failed");
                return error_response(StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE");
            }
        };
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(doc) => {
                if token_from_response {
                    if let Some(pos) = &token_position {
                        token = json_path_string(&doc, &pos.key);
                    }
                }
                if identity_match {
                    if let Some(uir) = &resolved.user_route {
                        register_identity(
                            &manager,
                            uir,
                            resolved.service_id,
                            &doc,
                            port,
                            &domain,
                            &token,
                            &mut username,
                        );
                    }
                }
                let level = resolve_level(&manager, port, &domain, &token, &mut username);
                if !bypass && !resolved.fields.is_empty() {
                    masking_level = level;
                    resp_parts.headers.remove(CONTENT_LENGTH);
                    let masked = mask_document(&bytes, &resolved.fields, level);
                    Response::from_parts(resp_parts, full_body(masked))
                } else {
                    Response::from_parts(resp_parts, full_body(bytes))
                }
            }
            // Not JSON after all: deliver untouched.
            Err(_) => Response::from_parts(resp_parts, full_body(bytes)),
        }
    } else {
        let level = resolve_level(&manager, port, &domain, &token, &mut username);
        if !bypass && is_json && !resolved.fields.is_empty() {
            masking_level = level;
            // Masked length is unknowable up front.
            resp_parts.headers.remove(CONTENT_LENGTH);
            let masked = MaskingBody::new(resp_body, Arc::clone(&resolved.fields), level);
            Response::from_parts(resp_parts, masked.boxed())
        } else {
            Response::from_parts(resp_parts, incoming_body(resp_body))
        }
    };

    trace::emit(&TraceRecord {
        custom_ip: &client_ip,
        domain: &domain,
        masking_level,
        path: &path,
        port,
        target: &target,
        username: &username,
    });

    response
}

/// The served domain: the Host header minus any port suffix.
fn host_domain(host: Option<&HeaderValue>) -> Option<String> {
    let host = host?.to_str().ok()?;
    let domain = host.split(':').next().unwrap_or(host);
    if domain.is_empty() {
        return None;
    }
    Some(domain.to_string())
}

fn is_truthy(value: Option<&HeaderValue>) -> bool {
    value
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| !v.is_empty() && v != "false" && v != "0")
}

fn extract_request_token(
    pos: &TokenPosition,
    parts: &request::Parts,
    body: Option<&[u8]>,
) -> String {
    match pos.location {
        TokenLocation::Header => parts
            .headers
            .get(pos.key.as_str())
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        TokenLocation::Query => parts
            .uri
            .query()
            .and_then(|q| form_value(q, &pos.key))
            .unwrap_or_default(),
        TokenLocation::Cookies => parts
            .headers
            .get(COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|header| cookie_value(header, &pos.key))
            .unwrap_or_default(),
        TokenLocation::Body => {
            let Some(body) = body else {
                return String::new();
            };
            let form_encoded = parts
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map_or(false, |ct| ct.contains("application/x-www-form-urlencoded"));
            if form_encoded {
                form_value(&String::from_utf8_lossy(body), &pos.key).unwrap_or_default()
            } else {
                serde_json::from_slice::<Value>(body)
                    .map(|doc| json_path_string(&doc, &pos.key))
                    .unwrap_or_default()
            }
        }
    }
}

/// Rewrite the inbound request for its upstream: swap in the target's scheme
/// and authority, strip the route prefix, join paths with exactly one slash,
/// merge query strings target-first, and add `X-Real-IP`.
fn build_upstream_request(
    parts: &request::Parts,
    target: &str,
    route_path: &str,
    client_ip: &str,
    body: ProxyBody,
) -> Result<Request<ProxyBody>, Box<Response<ProxyBody>>> {
    let target_uri: Uri = match target.parse() {
        Ok(uri) => uri,
        Err(_) => {
            error!(target, "invalid target URL");
            return Err(Box::new(error_response(
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_UNAVAILABLE",
            )));
        }
    };
    let scheme = target_uri.scheme_str().unwrap_or("http");
    let Some(authority) = target_uri.authority().map(ToString::to_string) else {
        error!(target, "target URL has no authority");
        return Err(Box::new(error_response(
            StatusCode::BAD_GATEWAY,
            "UPSTREAM_UNAVAILABLE",
        )));
    };

    let path = parts.uri.path();
    let rest = path
        .strip_prefix(route_path.trim_end_matches('/'))
        .unwrap_or(path);
    let joined = if rest.is_empty() {
        target_uri.path().to_string()
    } else {
        single_joining_slash(target_uri.path(), rest)
    };
    let query = match (target_uri.query(), parts.uri.query()) {
        (None, None) => String::new(),
        (Some(t), None) => format!("?{t}"),
        (None, Some(r)) => format!("?{r}"),
        (Some(t), Some(r)) => format!("?{t}&{r}"),
    };
    let uri = format!("{scheme}://{authority}{joined}{query}");

    let mut upstream_req = match Request::builder()
        .method(parts.method.clone())
        .uri(&uri)
        .body(body)
    {
        Ok(req) => req,
        Err(err) => {
            error!(target, error = %err, "failed to build upstream request");
            return Err(Box::new(error_response(
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_UNAVAILABLE",
            )));
        }
    };
    *upstream_req.headers_mut() = parts.headers.clone();
    upstream_req.headers_mut().remove(HOST);
    if let Ok(value) = HeaderValue::from_str(&authority) {
        upstream_req.headers_mut().insert(HOST, value);
    }
    if let Ok(value) = HeaderValue::from_str(client_ip) {
        upstream_req.headers_mut().insert("X-Real-IP", value);
    }
    Ok(upstream_req)
}

/// Resolve the clearance level for a token: cache hit wins, anything else is
/// the least-privileged default.
fn resolve_level(
    manager: &ProxyManager,
    port: u16,
    domain: &str,
    token: &str,
    username: &mut String,
) -> u8 {
    let mut level = 1;
    if !token.is_empty() {
        if let Some((cached_level, cached_user)) = manager.token_cache().resolve(port, domain, token)
        {
            if cached_level > 0 {
                level = cached_level;
            }
            if !cached_user.is_empty() {
                *username = cached_user;
            }
        }
    }
    level
}

/// Identity-route bookkeeping: pull the subject out of the response body,
/// resolve or register the user, and cache the token at their effective
/// clearance level (service override beats global level).
#[allow(clippy::too_many_arguments)]
fn register_identity(
    manager: &ProxyManager,
    uir: &UserInfoRoute,
    service_id: u64,
    doc: &Value,
    port: u16,
    domain: &str,
    token: &str,
    username: &mut String,
) {
    let unique_key = json_path_string(doc, &uir.unique_key_path);
    if unique_key.is_empty() {
        return;
    }
    let extracted = json_path_string(doc, &uir.username_path);
    *username = extracted.clone();

    let match_key = if uir.match_key == "-" {
        None
    } else {
        let key = json_path_string(doc, &uir.match_key);
        if key.is_empty() {
            return;
        }
        Some(key)
    };

    let user = match manager
        .provider()
        .user_by_unique_key(&extracted, &unique_key, match_key.as_deref())
    {
        Some(user) => user,
        None => {
            if extracted.is_empty() {
                return;
            }
            match manager.provider().create_user(&extracted, &unique_key) {
                Ok(user) => user,
                Err(err) => {
                    error!(username = %extracted, error = %err, "failed to register user");
                    return;
                }
            }
        }
    };

    let level = manager
        .provider()
        .user_service_level(user.id, service_id)
        .unwrap_or(user.sec_level);
    if !token.is_empty() {
        manager
            .token_cache()
            .cache(port, domain, token, level, &user.username);
    }
}

fn error_response(status: StatusCode, code: &str) -> Response<ProxyBody> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(full_body(format!("{{\"code\":\"{code}\"}}")))
        .unwrap_or_else(|_| Response::new(empty_body()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn parts_for(uri: &str) -> request::Parts {
        let (parts, ()) = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn test_host_domain_strips_port() {
        let value = HeaderValue::from_static("api.example.com:8443");
        assert_eq!(host_domain(Some(&value)).unwrap(), "api.example.com");
        let value = HeaderValue::from_static("api.example.com");
        assert_eq!(host_domain(Some(&value)).unwrap(), "api.example.com");
        assert!(host_domain(None).is_none());
    }

    #[test]
    fn test_truthy_header_values() {
        assert!(is_truthy(Some(&HeaderValue::from_static("true"))));
        assert!(is_truthy(Some(&HeaderValue::from_static("1"))));
        assert!(!is_truthy(Some(&HeaderValue::from_static("false"))));
        assert!(!is_truthy(Some(&HeaderValue::from_static("0"))));
        assert!(!is_truthy(Some(&HeaderValue::from_static(""))));
        assert!(!is_truthy(None));
    }

    #[test]
    fn test_request_token_from_query_and_cookie() {
        let parts = parts_for("http://x/api?token=q-1");
        let pos: TokenPosition = "request:query:token".parse().unwrap();
        assert_eq!(extract_request_token(&pos, &parts, None), "q-1");

        let mut parts = parts_for("http://x/api");
        parts
            .headers
            .insert(COOKIE, HeaderValue::from_static("sid=s-1; token=c-1"));
        let pos: TokenPosition = "request:cookies:token".parse().unwrap();
        assert_eq!(extract_request_token(&pos, &parts, None), "c-1");
    }

    #[test]
    fn test_request_token_from_body() {
        let mut parts = parts_for("http://x/api");
        let pos: TokenPosition = "request:body:auth.token".parse().unwrap();
        let body = br#"{"auth":{"token":"b-1"}}"#;
        assert_eq!(extract_request_token(&pos, &parts, Some(body)), "b-1");

        parts.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        let pos: TokenPosition = "request:body:token".parse().unwrap();
        assert_eq!(
            extract_request_token(&pos, &parts, Some(b"token=f-1&x=y")),
            "f-1"
        );
    }

    #[test]
    fn test_upstream_request_rewrite() {
        let parts = parts_for("http://gw/api/users/7?page=2");
        let req = build_upstream_request(
            &parts,
            "http://10.0.0.1:8080/base?env=prod",
            "/api",
            "203.0.113.9",
            empty_body(),
        )
        .unwrap();
        assert_eq!(
            req.uri().to_string(),
            "http://10.0.0.1:8080/base/users/7?env=prod&page=2"
        );
        assert_eq!(req.headers().get(HOST).unwrap(), "10.0.0.1:8080");
        assert_eq!(req.headers().get("X-Real-IP").unwrap(), "203.0.113.9");
    }

    #[test]
    fn test_upstream_request_root_route() {
        let parts = parts_for("http://gw/health");
        let req = build_upstream_request(
            &parts,
            "http://10.0.0.1:8080",
            "/",
            "203.0.113.9",
            empty_body(),
        )
        .unwrap();
        assert_eq!(req.uri().to_string(), "http://10.0.0.1:8080/health");
    }

    #[test]
    fn test_invalid_target_is_rejected() {
        let parts = parts_for("http://gw/api");
        assert!(build_upstream_request(&parts, "::: not a url", "/api", "1.1.1.1", empty_body())
            .is_err());
    }
}
