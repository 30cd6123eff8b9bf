macro_rules! version {
    () => {
        env!("CARGO_PKG_VERSION")
    };
    ($prefix:literal) => {
        concat!($prefix, env!("CARGO_PKG_VERSION"))
    };
}
