use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;

/// Builds a per-route rate-limit layer. `tower_governor` requires a
/// `'static` config reference; leaking a small, bounded number of these
/// (one per distinct route limit) is the crate's documented pattern and
/// costs nothing at the scale of a handful of routes.
///
/// `per_minute`/`per_hour` mirror the Python reference's `flask_limiter`
/// decorations (`original_source/src/api/auth.py`,
/// `.../blockchain_routes.py`, `.../stablecoin_routes.py`); `burst` caps
/// how many requests can arrive before the steady-state rate applies.
pub fn per_minute(count: u64, burst: u32) -> GovernorLayer<'static, tower_governor::key_extractor::PeerIpKeyExtractor> {
    let per_second = (60.0 / count as f64).ceil().max(1.0) as u64;
    let config = Box::leak(Box::new(
        GovernorConfigBuilder::default()
            .per_second(per_second)
            .burst_size(burst)
            .finish()
            .expect("static governor config"),
    ));
    GovernorLayer { config }
}

pub fn per_hour(count: u64, burst: u32) -> GovernorLayer<'static, tower_governor::key_extractor::PeerIpKeyExtractor> {
    let per_second = (3600.0 / count as f64).ceil().max(1.0) as u64;
    let config = Box::leak(Box::new(
        GovernorConfigBuilder::default()
            .per_second(per_second)
            .burst_size(burst)
            .finish()
            .expect("static governor config"),
    ));
    GovernorLayer { config }
}
