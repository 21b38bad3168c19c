/// Install colored panic and backtrace output. Call before anything else in `main`.
pub fn setup() {
    color_backtrace::install();
}
