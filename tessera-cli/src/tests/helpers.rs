//! Test helpers for writing JSON sources and running commands in-process.

use super::*;
use serde_json::json;
use tempfile::TempDir;

/// Temporary directory holding a store and its sources.
pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 tempdir");
        Self { _dir: dir, root }
    }

    pub(super) fn store_dir(&self) -> Utf8PathBuf {
        self.root.join("store")
    }

    /// Write `city.json` with `stops` point features and `parks` polygons.
    pub(super) fn write_source(&self, stops: usize, parks: usize) -> Utf8PathBuf {
        let stop_features: Vec<_> = (0..stops)
            .map(|index| {
                json!({
                    "name": format!("stop-{index}"),
                    "geometry": {"type": "Point", "coordinates": [index, 0]},
                    "attributes": {"index": index}
                })
            })
            .collect();
        let park_features: Vec<_> = (0..parks)
            .map(|index| {
                json!({
                    "name": format!("park-{index}"),
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[index, 0], [index, 1], [1, 1], [index, 0]]]
                    }
                })
            })
            .collect();
        let document = json!({
            "provider": "survey",
            "feature_sets": [
                {"name": "stops", "features": stop_features},
                {"name": "parks", "features": park_features}
            ]
        });
        let path = self.root.join("city.json");
        std::fs::write(&path, document.to_string()).expect("write source");
        path
    }
}

/// Parse `args` as if passed after the binary name and run them, returning
/// what the command printed.
pub(super) fn run_args<I, S>(args: I) -> Result<String, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let argv = std::iter::once(String::from("tessera")).chain(args.into_iter().map(Into::into));
    let cli = Cli::try_parse_from(argv)?;
    let mut output = Vec::new();
    run_with(cli, &mut output)?;
    Ok(String::from_utf8(output).expect("utf-8 output"))
}
