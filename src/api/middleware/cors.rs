use http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// `*` opens the read surface up entirely (dev); anything else is parsed as a
/// comma-separated list of exact origins.
pub fn cors_layer(allow_origins: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET, Method::POST]);

    if allow_origins.trim() == "*" {
        return layer.allow_origin(AllowOrigin::any());
    }

    let origins: Vec<HeaderValue> = allow_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}
