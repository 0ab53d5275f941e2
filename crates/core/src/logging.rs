use tracing_subscriber::EnvFilter;

/// 初始化全局tracing订阅器。RUST_LOG覆盖默认过滤级别；
/// 重复初始化返回false而不是panic，便于测试环境调用。
pub fn init_logging(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
