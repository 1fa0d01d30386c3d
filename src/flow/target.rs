//! URL resolution strategy for the service URL a flow returns to.

use url::Url;

use crate::web::Request;

/// Determines the URL the user is sent back to once a flow completes.
///
/// The variant set is closed: flows are configured with exactly one strategy
/// at construction time.
#[derive(Debug, Clone)]
pub enum Target {
    /// Use the request URI as-is.
    Request,

    /// Use a fixed base URL, keeping the request's path, query and fragment.
    /// Suits deployments behind a reverse proxy where the request URI carries
    /// an internal host name.
    Base(Url),
}

impl Target {
    /// Creates a [`Target::Base`] from a URL string.
    pub fn base(url: &str) -> Self {
        Target::Base(Url::parse(url).expect("invalid base URL"))
    }

    /// Resolves the service URL for the given request.
    pub fn resolve(&self, request: &Request) -> Url {
        match self {
            Target::Request => request.uri().clone(),
            Target::Base(base) => {
                let mut url = base.clone();
                let path = format!(
                    "{}{}",
                    base.path().trim_end_matches('/'),
                    request.uri().path()
                );
                url.set_path(&path);
                url.set_query(request.uri().query());
                url.set_fragment(request.uri().fragment());
                url
            }
        }
    }
}
