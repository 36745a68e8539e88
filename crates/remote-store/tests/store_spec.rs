use remote_store::{
    FsStore, GcsStore, MemoryStore, RemoteError, RemoteRef, RemoteStore, StoreRegistry,
};
use std::io::{Read, Write};
use std::sync::Arc;

fn write_object(store: &dyn RemoteStore, reference: &str, bytes: &[u8]) {
    let reference = RemoteRef::parse(reference).unwrap();
    let mut sink = store.open_write(&reference).unwrap();
    sink.write_all(bytes).unwrap();
    sink.finish().unwrap();
}

fn read_object(store: &dyn RemoteStore, reference: &str) -> Vec<u8> {
    let reference = RemoteRef::parse(reference).unwrap();
    let mut bytes = Vec::new();
    store
        .open_read(&reference)
        .unwrap()
        .read_to_end(&mut bytes)
        .unwrap();
    bytes
}

#[test]
fn memory_store_round_trip_is_byte_identical() {
    let store = MemoryStore::new();
    let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    write_object(&store, "gs://mock/blob.bin", &payload);
    assert_eq!(read_object(&store, "gs://mock/blob.bin"), payload);
}

#[test]
fn fs_store_round_trip_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsStore::new(dir.path());
    let payload = b"line one\nline two\n\x00\xff".to_vec();
    write_object(&store, "file://bucket/nested/dir/blob", &payload);
    assert_eq!(read_object(&store, "file://bucket/nested/dir/blob"), payload);
    assert!(dir.path().join("bucket/nested/dir/blob").is_file());
}

#[test]
fn fs_store_missing_object_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsStore::new(dir.path());
    let reference = RemoteRef::parse("file://bucket/absent").unwrap();
    assert!(matches!(
        store.open_read(&reference),
        Err(RemoteError::NotFound { .. })
    ));
}

#[test]
fn registry_dispatches_on_scheme() {
    let memory = MemoryStore::new();
    let dir = tempfile::tempdir().unwrap();
    let registry = StoreRegistry::new()
        .with_store("gs", Arc::new(memory.clone()))
        .with_store("file", Arc::new(FsStore::new(dir.path())));

    write_object(&registry, "gs://mock/a", b"to memory");
    write_object(&registry, "file://local/b", b"to disk");

    assert_eq!(memory.get("gs://mock/a").as_deref(), Some(&b"to memory"[..]));
    assert!(memory.get("file://local/b").is_none());
    assert_eq!(
        std::fs::read(dir.path().join("local/b")).unwrap(),
        b"to disk".to_vec()
    );
    assert_eq!(registry.schemes().collect::<Vec<_>>(), vec!["file", "gs"]);
}

#[test]
fn registry_rejects_unknown_scheme() {
    let registry = StoreRegistry::new().with_store("gs", Arc::new(MemoryStore::new()));
    let reference = RemoteRef::parse("s3://bucket/key").unwrap();
    match registry.open_read(&reference) {
        Err(RemoteError::UnsupportedScheme { scheme, .. }) => assert_eq!(scheme, "s3"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected an error"),
    }
}

mod gcs {
    use super::*;
    use httptest::{matchers::*, responders::*, Expectation, Server};

    fn store_for(server: &Server) -> GcsStore {
        GcsStore::new(
            Some(format!("http://{}", server.addr())),
            Some("test-token".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn downloads_object_media() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/storage/v1/b/inputs/o/dir%2Fref.fa"),
                request::query(url_decoded(contains(("alt", "media")))),
                request::headers(contains(("authorization", "Bearer test-token"))),
            ])
            .respond_with(status_code(200).body(">chr1\nACGT\n")),
        );

        let store = store_for(&server);
        assert_eq!(
            read_object(&store, "gs://inputs/dir/ref.fa"),
            b">chr1\nACGT\n".to_vec()
        );
    }

    #[test]
    fn missing_object_maps_to_not_found() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                "/storage/v1/b/inputs/o/missing",
            ))
            .respond_with(status_code(404)),
        );

        let store = store_for(&server);
        let reference = RemoteRef::parse("gs://inputs/missing").unwrap();
        assert!(matches!(
            store.open_read(&reference),
            Err(RemoteError::NotFound { .. })
        ));
    }

    #[test]
    fn uploads_object_with_media_upload() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/upload/storage/v1/b/results/o"),
                request::query(url_decoded(contains(("uploadType", "media")))),
                request::query(url_decoded(contains(("name", "run-1/out.txt")))),
                request::headers(contains(("authorization", "Bearer test-token"))),
            ])
            .respond_with(status_code(200)),
        );

        let store = store_for(&server);
        write_object(&store, "gs://results/run-1/out.txt", b"out\n");
    }

    #[test]
    fn server_errors_are_retried() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/storage/v1/b/inputs/o/flaky"))
                .times(2)
                .respond_with(cycle![
                    status_code(503),
                    status_code(200).body("recovered"),
                ]),
        );

        let store = store_for(&server);
        assert_eq!(read_object(&store, "gs://inputs/flaky"), b"recovered".to_vec());
    }
}
