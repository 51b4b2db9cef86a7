#![allow(dead_code)]

use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use tempfile::{NamedTempFile, TempPath};

pub const MANIFEST: &str = r#"[
  {"id": 1, "title": "A", "order": 1, "content": "content/a.md", "critical": true,
   "directories": [{"id": 2, "title": "B", "parentId": 1}]},
  {"id": 3, "title": "C", "order": 0}
]"#;

/// gzip-compressed tar archive holding `files`.
pub fn gzip_tar(files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, path, *contents)
            .expect("append tar entry");
    }
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}

/// A bundle archive with the default manifest and one content file.
pub fn bundle_archive() -> Vec<u8> {
    gzip_tar(&[
        ("structure.json", MANIFEST.as_bytes()),
        ("content/a.md", b"# A"),
    ])
}

/// Write `bytes` to a temp file inside `dir`, as a transport download would.
pub fn downloaded_file(dir: &Path, bytes: &[u8]) -> TempPath {
    let mut file = NamedTempFile::new_in(dir).expect("temp file");
    file.write_all(bytes).expect("write temp file");
    file.into_temp_path()
}

pub fn publish_response(publish_date: &str, download_url: &str) -> Value {
    json!({
        "data": {
            "id": "publish-7",
            "publish_date": publish_date,
            "download_url": download_url,
            "languages": ["en", "fr"]
        }
    })
}

/// Relative paths of every regular file below `root`, sorted.
pub fn file_set(root: &Path) -> Vec<String> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) {
        for entry in std::fs::read_dir(dir).expect("read_dir") {
            let path = entry.expect("entry").path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                let rel = path.strip_prefix(root).expect("under root");
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}
