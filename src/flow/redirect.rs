//! Redirect handling with URL-fragment preservation.
//!
//! Fragments are a purely client-side concept: the authorization server never
//! sees them, and a plain `Location` redirect would drop them. Login
//! redirects are therefore sent as an HTML page whose script forwards
//! `document.location.hash`, with a meta refresh as fallback for disabled
//! JavaScript (degrading by losing the fragment). Server-side, a fragment is
//! carried in a reserved query parameter until the final redirect re-attaches
//! it.

use url::Url;

use crate::web::Response;

/// Reserved parameter name carrying a captured URL fragment.
pub const FRAGMENT: &str = "_";

/// Replaces a fragment in the given URI by the reserved parameter. Request
/// URIs only carry fragments in test code; real user agents never transmit
/// them.
pub fn service(uri: &Url) -> Url {
    let Some(fragment) = uri.fragment().map(str::to_string) else {
        return uri.clone();
    };
    let mut service = uri.clone();
    service.set_fragment(None);
    service.query_pairs_mut().append_pair(FRAGMENT, &fragment);
    service
}

/// Sends a login redirect to `target` running the given fragment-forwarding
/// script. The meta refresh stays in the body rather than in an HTTP header
/// so the script has executed by the time it fires.
pub fn login(response: &mut Response, target: &str, script: &str) {
    let page = format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         <title>Redirect</title>\n\
         <meta http-equiv=\"refresh\" content=\"1; URL={target}\">\n\
         </head>\n\
         <body>\n\
         <script type=\"text/javascript\">\n{script}\n</script>\n\
         </body>\n\
         </html>"
    );
    response.send(page, "text/html");
}

/// Script forwarding the fragment by appending `_` and the encoded hash to
/// the redirect target, whose last query parameter is the state token.
pub fn forward_to_state(target: &str) -> String {
    format!(
        "var target = \"{target}\";\n\
         var hash = document.location.hash.substring(1);\n\
         if (hash) {{\n\
           document.location.replace(target + \"{FRAGMENT}\" + encodeURIComponent(hash));\n\
         }} else {{\n\
           document.location.replace(target);\n\
         }}"
    )
}

/// Script forwarding the fragment inside an URL-valued query parameter, e.g.
/// the CAS `service` parameter: the reserved parameter is appended to the
/// embedded URL, encoded once more.
pub fn forward_inside_service(target: &str, embedded_has_query: bool) -> String {
    let separator = if embedded_has_query { "&" } else { "?" };
    format!(
        "var target = \"{target}\";\n\
         var hash = document.location.hash.substring(1);\n\
         if (hash) {{\n\
           document.location.replace(target + encodeURIComponent(\n\
             \"{separator}{FRAGMENT}=\" + encodeURIComponent(hash)\n\
           ));\n\
         }} else {{\n\
           document.location.replace(target);\n\
         }}"
    )
}

/// Script calling back into the protected application itself to store the
/// fragment in the session before continuing to the authorization server.
pub fn forward_via_self(target: &str, own_uri: &Url, state_param: &str, state: &str) -> String {
    let separator = if own_uri.query().is_some() { "&" } else { "?" };
    format!(
        "var target = \"{target}\";\n\
         var hash = document.location.hash.substring(1);\n\
         if (hash) {{\n\
           var s = document.createElement(\"script\");\n\
           s.src = \"{own_uri}{separator}{state_param}={state}&{FRAGMENT}=\" + encodeURIComponent(hash);\n\
           document.body.appendChild(s);\n\
         }} else {{\n\
           document.location.replace(target);\n\
         }}"
    )
}

/// Final redirect back into the application, replacing the reserved parameter
/// with the fragment it carries.
pub fn finalize(response: &mut Response, service: &Url) {
    let mut target = service.clone();
    let fragment = service
        .query_pairs()
        .find(|(name, _)| name == FRAGMENT)
        .map(|(_, value)| value.into_owned());

    if let Some(fragment) = fragment {
        let remaining: Vec<(String, String)> = service
            .query_pairs()
            .filter(|(name, _)| name != FRAGMENT)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        target.set_query(None);
        if !remaining.is_empty() {
            target.query_pairs_mut().extend_pairs(remaining);
        }
        target.set_fragment(Some(&fragment));
    }

    response.answer(302);
    response.header("Location", target.to_string());
}

/// Plain 302 redirect to the given location.
pub fn relocate(response: &mut Response, location: &str) {
    response.answer(302);
    response.header("Location", location.to_string());
}
