//! Byte source tests: the capability gate and length probing.


use pdf_x_bridge::bridge::{check_capabilities, probe_length};
use pdf_x_bridge::engine::{Engine, FileAccess, RawDocument};
use pdf_x_bridge::{
    BufferSource, ByteSource, Capabilities, DocumentHandle, Error, ForwardSource, OpenOptions,
};
use std::cell::Cell;
use std::ffi::CStr;
use std::io::{self, Cursor, SeekFrom};
use std::os::raw::{c_int, c_ulong};
use std::rc::Rc;
use test_utils::*;

/// Engine that only records whether it was ever called.
#[derive(Default)]
struct UntouchedEngine {
    calls: Rc<Cell<usize>>,
}

impl Engine for UntouchedEngine {
    unsafe fn load_custom_document(
        &self,
        _: *mut FileAccess,
        _: Option<&CStr>,
    ) -> Option<RawDocument> {
        self.calls.set(self.calls.get() + 1);
        None
    }

    unsafe fn page_count(&self, _: RawDocument) -> c_int {
        self.calls.set(self.calls.get() + 1);
        0
    }

    unsafe fn page_size(&self, _: RawDocument, _: c_int) -> Option<(f64, f64)> {
        self.calls.set(self.calls.get() + 1);
        None
    }

    unsafe fn close_document(&self, _: RawDocument) {
        self.calls.set(self.calls.get() + 1);
    }

    fn last_error(&self) -> c_ulong {
        1
    }
}

/// A source that claims to lack some operations.
struct PartialSource {
    inner: CountingSource,
    capabilities: Capabilities,
}

impl ByteSource for PartialSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }

    fn tell(&mut self) -> io::Result<u64> {
        self.inner.tell()
    }

    fn read_into(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read_into(buf)
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner.close()
    }
}

#[test]
fn test_every_missing_operation_is_rejected_before_the_engine() {
    init_logging();

    for mask in 0..7u8 {
        let capabilities = Capabilities {
            seek: mask & 1 != 0,
            tell: mask & 2 != 0,
            read_into: mask & 4 != 0,
        };
        let inner = CountingSource::new(pdf_with_pages(1));
        let (seeks, reads, closes) =
            (inner.seeks.clone(), inner.reads.clone(), inner.closes.clone());
        let engine = UntouchedEngine::default();
        let calls = engine.calls.clone();

        let result = DocumentHandle::open_with(
            engine,
            Box::new(PartialSource { inner, capabilities }),
            &OpenOptions::new(),
        );

        match result {
            Err(Error::Configuration { missing }) => assert_eq!(missing, capabilities.missing()),
            other => panic!("expected a configuration error for {capabilities:?}, got {other:?}"),
        }
        assert_eq!(calls.get(), 0, "engine was called for {capabilities:?}");
        assert_eq!(seeks.get(), 0);
        assert_eq!(reads.get(), 0);
        assert_eq!(closes.get(), 1, "rejected source should still be closed");
    }
}

#[test]
fn test_forward_source_is_a_configuration_error() {
    let data = pdf_with_pages(1);
    let result = pdf_x_bridge::open_source(Box::new(ForwardSource::new(&data[..])), None);
    match result {
        Err(Error::Configuration { missing }) => assert_eq!(missing, vec!["seek", "tell"]),
        other => panic!("expected a configuration error, got {other:?}"),
    }
}

#[test]
fn test_unsupported_seek_at_runtime_is_a_configuration_error() {
    /// Reports full capabilities but cannot actually tell.
    struct Liar;

    impl ByteSource for Liar {
        fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
            Ok(0)
        }

        fn tell(&mut self) -> io::Result<u64> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "no tell"))
        }

        fn read_into(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    assert!(check_capabilities(&Liar).is_ok());
    assert!(matches!(
        pdf_x_bridge::open_source(Box::new(Liar), None),
        Err(Error::Configuration { missing }) if missing == vec!["tell"]
    ));
}

#[test]
fn test_length_probe_has_no_side_effects() {
    let data = padded_pdf(2, 5_000);
    for start in [0u64, 1, 777, 4_999, 5_000] {
        let mut source = BufferSource::new(Cursor::new(data.clone()));
        source.seek(SeekFrom::Start(start)).unwrap();

        assert_eq!(probe_length(&mut source).unwrap(), data.len() as u64);
        assert_eq!(source.tell().unwrap(), start);
    }
}

#[test]
fn test_handle_reports_probed_length() {
    let data = padded_pdf(3, 10_000);
    let mut cursor = Cursor::new(data);
    cursor.set_position(4_321);

    let doc = pdf_x_bridge::open_source(Box::new(BufferSource::new(&mut cursor)), None).unwrap();
    assert_eq!(doc.file_len().unwrap(), 10_000);
    drop(doc);

    assert_eq!(cursor.get_ref().len(), 10_000);
}

#[test]
fn test_missing_path_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    match pdf_x_bridge::open_path(dir.path().join("absent.pdf"), None) {
        Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
        other => panic!("expected NotFound, got {other:?}"),
    }
}
