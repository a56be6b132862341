//! Prometheus metrics export
//!
//! The client crates record:
//!
//! - `ecobee_requests_total` (counter): label `outcome`
//! - `ecobee_token_refresh_total` (counter): label `result`
//!
//! A CLI run is too short-lived to scrape, so when `metrics_path` is set the
//! rendered exposition is written there on exit for the node_exporter
//! textfile collector.

use std::path::Path;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and return a handle for rendering.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Render metrics to `path`, replacing it atomically.
pub fn write_textfile(handle: &PrometheusHandle, path: &Path) -> std::io::Result<()> {
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, handle.render())?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_textfile_renders_counters() {
        // build_recorder() keeps the recorder local; install_recorder() may
        // only succeed once per process.
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        metrics::counter!("ecobee_requests_total", "outcome" => "success").increment(2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecobee.prom");
        write_textfile(&handle, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("ecobee_requests_total{outcome=\"success\"} 2"));
        assert!(!dir.path().join("ecobee.prom.tmp").exists());
    }

    #[test]
    fn test_write_textfile_missing_directory() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let result = write_textfile(&handle, Path::new("/nonexistent/dir/ecobee.prom"));
        assert!(result.is_err());
    }
}
