//! CAS serviceValidate response parsing.

use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::{Map, Value};

use crate::error::AuthError;

/// Parses a `cas:serviceResponse` document.
///
/// `cas:authenticationSuccess` yields the user attributes as a map with the
/// `cas:user` element under `username` and each `cas:attributes` child under
/// its local name. `cas:authenticationFailure` is a provider rejection; any
/// other document shape is malformed.
pub fn service_response(xml: &str) -> Result<Map<String, Value>, AuthError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut user: Option<Map<String, Value>> = None;
    let mut failure: Option<(String, String)> = None;
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                match name.as_str() {
                    "cas:authenticationSuccess" => user = Some(Map::new()),
                    "cas:authenticationFailure" => {
                        let code = element
                            .try_get_attribute("code")
                            .ok()
                            .flatten()
                            .and_then(|attribute| attribute.unescape_value().ok())
                            .map(|value| value.into_owned())
                            .unwrap_or_default();
                        failure = Some((code, String::new()));
                    }
                    _ => {}
                }
                path.push(name);
            }
            Ok(Event::Text(text)) => {
                let text = text
                    .unescape()
                    .map_err(|e| AuthError::MalformedResponse(format!("UNEXPECTED: {e}")))?;
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }

                match path.last().map(String::as_str) {
                    Some("cas:authenticationFailure") => {
                        if let Some((_, message)) = failure.as_mut() {
                            *message = text.to_string();
                        }
                    }
                    Some("cas:user") => {
                        if let Some(user) = user.as_mut() {
                            user.insert("username".to_string(), Value::String(text.to_string()));
                        }
                    }
                    Some(name) => {
                        let inside_attributes =
                            path.iter().any(|element| element == "cas:attributes");
                        if let (Some(user), true) = (user.as_mut(), inside_attributes) {
                            let attribute = name.strip_prefix("cas:").unwrap_or(name);
                            user.insert(attribute.to_string(), Value::String(text.to_string()));
                        }
                    }
                    None => {}
                }
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(AuthError::MalformedResponse(format!("UNEXPECTED: {e}")));
            }
        }
    }

    if let Some((code, message)) = failure {
        return Err(AuthError::ProviderRejected { code, message });
    }
    match user {
        Some(user) if !user.is_empty() => Ok(user),
        _ => Err(AuthError::MalformedResponse(format!(
            "UNEXPECTED: no authentication result in {xml:?}"
        ))),
    }
}
