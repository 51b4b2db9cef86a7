use std::fs;
use std::io::Write;
use std::sync::{Arc, Mutex};

use bundle_sync_core::contract::{MockTransport, ProgressHandler};
use bundle_sync_core::error::{ResolveError, TransportError};
use bundle_sync_core::resolver::PathResolver;
use tempfile::{tempdir, NamedTempFile, TempDir};
use url::Url;

fn resolver_with_bundle() -> (TempDir, PathResolver) {
    let root = tempdir().unwrap();
    let bundle = root.path().join("CIEBundle");
    fs::create_dir_all(bundle.join("content/images")).unwrap();
    fs::write(bundle.join("content/a.md"), b"# A").unwrap();
    fs::write(bundle.join("content/images/logo.png"), b"png").unwrap();
    fs::write(bundle.join("README"), b"readme").unwrap();
    let resolver = PathResolver::new(bundle, root.path().join("documents"));
    (root, resolver)
}

fn remote_file(contents: &[u8]) -> tempfile::TempPath {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents).unwrap();
    file.into_temp_path()
}

#[test]
fn resolves_existing_bundle_paths_only() {
    let (_root, resolver) = resolver_with_bundle();

    let found = resolver.resolve_bundle_path("content/a.md").unwrap();
    assert_eq!(found, resolver.bundle_root().join("content/a.md"));
    assert_eq!(
        resolver.resolve_bundle_path("/content/a.md"),
        Some(found)
    );
    assert!(resolver.resolve_bundle_path("content/missing.md").is_none());
    assert!(resolver.resolve_bundle_path("../CIEBundle/content/a.md").is_none());
}

#[test]
fn resolves_resources_by_name_and_extension() {
    let (_root, resolver) = resolver_with_bundle();

    assert!(resolver
        .resolve_resource("logo", "png", Some("content/images"))
        .is_some());
    assert!(resolver
        .resolve_resource("logo", "png", Some("content/images/"))
        .is_some());
    assert!(resolver.resolve_resource("README", "", None).is_some());
    assert!(resolver.resolve_resource("logo", "jpg", Some("content/images")).is_none());
}

#[test]
fn document_lookup_uses_last_url_segment() {
    let (_root, resolver) = resolver_with_bundle();
    let url = Url::parse("https://cdn.example.org/files/guide.pdf?v=2").unwrap();

    assert_eq!(
        resolver.document_path(&url),
        Some(resolver.documents_root().join("guide.pdf"))
    );
    assert!(resolver.resolve_document(&url).is_none());
}

#[tokio::test]
async fn download_document_stores_and_replaces_copy() {
    let (_root, resolver) = resolver_with_bundle();
    let url = Url::parse("https://cdn.example.org/files/guide.pdf").unwrap();

    let mut transport = MockTransport::new();
    let mut versions = vec![remote_file(b"second"), remote_file(b"first")];
    transport
        .expect_download_file()
        .times(2)
        .returning(move |_, _| Ok(versions.pop().unwrap()));

    let stored = resolver.download_document(&transport, &url, None).await.unwrap();
    assert_eq!(fs::read(&stored).unwrap(), b"first");
    assert_eq!(resolver.resolve_document(&url), Some(stored.clone()));

    let again = resolver.download_document(&transport, &url, None).await.unwrap();
    assert_eq!(again, stored);
    assert_eq!(fs::read(&again).unwrap(), b"second");
}

#[tokio::test]
async fn download_document_passes_progress_through() {
    let (_root, resolver) = resolver_with_bundle();
    let url = Url::parse("https://cdn.example.org/files/guide.pdf").unwrap();
    let calls = Arc::new(Mutex::new(Vec::new()));

    let mut transport = MockTransport::new();
    let file = remote_file(b"pdf");
    transport
        .expect_download_file()
        .times(1)
        .return_once(move |_, progress| {
            if let Some(progress) = progress {
                progress(3, Some(3));
            }
            Ok(file)
        });

    let recorded = calls.clone();
    let progress: ProgressHandler = Arc::new(move |done, total| {
        recorded.lock().unwrap().push((done, total));
    });
    resolver
        .download_document(&transport, &url, Some(progress))
        .await
        .unwrap();

    assert_eq!(*calls.lock().unwrap(), vec![(3, Some(3))]);
}

#[tokio::test]
async fn download_document_failure_keeps_existing_copy() {
    let (_root, resolver) = resolver_with_bundle();
    let url = Url::parse("https://cdn.example.org/files/guide.pdf").unwrap();
    fs::create_dir_all(resolver.documents_root()).unwrap();
    fs::write(resolver.documents_root().join("guide.pdf"), b"cached").unwrap();

    let mut transport = MockTransport::new();
    transport.expect_download_file().returning(|url, _| {
        Err(TransportError::Status {
            status: 500,
            url: url.to_string(),
        })
    });

    let err = resolver
        .download_document(&transport, &url, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::Transport(_)), "got {err:?}");
    assert_eq!(
        fs::read(resolver.documents_root().join("guide.pdf")).unwrap(),
        b"cached"
    );
}

#[tokio::test]
async fn download_document_needs_a_file_name() {
    let (_root, resolver) = resolver_with_bundle();
    let url = Url::parse("https://cdn.example.org/").unwrap();

    let mut transport = MockTransport::new();
    transport.expect_download_file().never();

    let err = resolver
        .download_document(&transport, &url, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::NoFileName(_)), "got {err:?}");
}
