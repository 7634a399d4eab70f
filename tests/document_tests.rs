//! Document handle tests against the native engine.


use pdf_x_bridge::{BufferSource, ByteSource, Error, OpenOptions, PathSource, State};
use std::cell::RefCell;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::rc::Rc;
use test_utils::*;

fn open_bytes(
    data: Vec<u8>,
    password: Option<&str>,
) -> pdf_x_bridge::Result<pdf_x_bridge::DocumentHandle<'static>> {
    pdf_x_bridge::open_source(Box::new(BufferSource::new(Cursor::new(data))), password)
}

// ============================================================================
// Page count gate
// ============================================================================

#[test]
fn test_zero_page_document_is_rejected() {
    init_logging();
    match open_bytes(pdf_with_count(0), None) {
        Err(Error::PageCountInvalid { count }) => assert_eq!(count, 0),
        other => panic!("expected PageCountInvalid, got {other:?}"),
    }
}

#[test]
fn test_negative_page_count_is_rejected() {
    let source = CountingSource::new(pdf_with_count(-3));
    let closes = source.closes.clone();

    match pdf_x_bridge::open_source(Box::new(source), None) {
        Err(Error::PageCountInvalid { count }) => assert_eq!(count, -3),
        other => panic!("expected PageCountInvalid, got {other:?}"),
    }
    assert_eq!(closes.get(), 1);
}

#[test]
fn test_page_count_error_mentions_password_and_damage() {
    let message = Error::PageCountInvalid { count: 0 }.to_string();
    assert!(message.contains("password"));
    assert!(message.contains("damaged"));
}

#[test]
fn test_single_page_document_opens() {
    let doc = open_bytes(pdf_with_pages(1), None).unwrap();
    assert!(doc.is_open());
    assert_eq!(doc.state(), State::Open);
    assert_eq!(doc.page_count().unwrap(), 1);
}

// ============================================================================
// Closing
// ============================================================================

#[test]
fn test_close_twice_releases_once() {
    let source = CountingSource::new(pdf_with_pages(2));
    let closes = source.closes.clone();

    let mut doc = pdf_x_bridge::open_source(Box::new(source), None).unwrap();
    doc.close().unwrap();
    assert_eq!(doc.state(), State::Closed);
    assert_eq!(closes.get(), 1);

    doc.close().unwrap();
    drop(doc);
    assert_eq!(closes.get(), 1);
}

#[test]
fn test_drop_closes_source() {
    let source = CountingSource::new(pdf_with_pages(2));
    let closes = source.closes.clone();
    {
        let _doc = pdf_x_bridge::open_source(Box::new(source), None).unwrap();
        assert_eq!(closes.get(), 0);
    }
    assert_eq!(closes.get(), 1);
}

#[test]
fn test_queries_after_close_fail() {
    let mut doc = open_bytes(pdf_with_pages(2), None).unwrap();
    doc.close().unwrap();

    assert!(!doc.is_open());
    assert!(matches!(doc.page_count(), Err(Error::Closed)));
    assert!(matches!(doc.page_size(0), Err(Error::Closed)));
    assert!(matches!(doc.block_stats(), Err(Error::Closed)));
    assert!(matches!(doc.file_len(), Err(Error::Closed)));
}

// ============================================================================
// Round trip through a 10,000 byte document
// ============================================================================

/// Shares a [`PathSource`] with the test so its state can be inspected
/// after the handle has closed it.
struct SharedPath(Rc<RefCell<PathSource>>);

impl ByteSource for SharedPath {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.borrow_mut().seek(pos)
    }

    fn tell(&mut self) -> io::Result<u64> {
        self.0.borrow_mut().tell()
    }

    fn read_into(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.borrow_mut().read_into(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        self.0.borrow_mut().close()
    }
}

#[test]
fn test_round_trip_from_path() {
    init_logging();
    let data = padded_pdf(3, 10_000);
    assert_eq!(data.len(), 10_000);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("three.pdf");
    std::fs::write(&path, &data).unwrap();

    let mut doc = pdf_x_bridge::open(path.as_path(), None).unwrap();
    assert_eq!(doc.page_count().unwrap(), 3);
    assert_eq!(doc.file_len().unwrap(), 10_000);
    doc.close().unwrap();

    let shared = Rc::new(RefCell::new(PathSource::open(&path).unwrap()));
    let mut doc = pdf_x_bridge::open_source(Box::new(SharedPath(shared.clone())), None).unwrap();
    assert_eq!(doc.page_count().unwrap(), 3);
    assert!(!shared.borrow().is_closed());

    doc.close().unwrap();
    assert!(shared.borrow().is_closed());
    assert_eq!(
        shared.borrow_mut().tell().unwrap_err().kind(),
        io::ErrorKind::NotConnected
    );
}

#[test]
fn test_round_trip_from_borrowed_buffer() {
    let data = padded_pdf(3, 10_000);
    let mut cursor = Cursor::new(data.clone());

    let mut doc =
        pdf_x_bridge::open_source(Box::new(BufferSource::new(&mut cursor)), None).unwrap();
    assert_eq!(doc.page_count().unwrap(), 3);
    doc.close().unwrap();
    drop(doc);

    // The caller's buffer is untouched and still usable
    assert_eq!(cursor.get_ref(), &data);
    cursor.seek(SeekFrom::Start(0)).unwrap();
    let mut header = [0u8; 5];
    cursor.read_exact(&mut header).unwrap();
    assert_eq!(&header, b"%PDF-");
}

#[test]
fn test_open_accepts_path_strings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("two.pdf");
    std::fs::write(&path, pdf_with_pages(2)).unwrap();

    let doc = pdf_x_bridge::open(path.to_str().unwrap(), None).unwrap();
    assert_eq!(doc.page_count().unwrap(), 2);
    let doc = OpenOptions::new().open(path.clone()).unwrap();
    assert_eq!(doc.page_count().unwrap(), 2);
}

#[test]
fn test_non_pdf_is_format_error() {
    assert!(matches!(
        open_bytes(b"GIF89a definitely not a document".to_vec(), None),
        Err(Error::Format)
    ));
    assert!(matches!(
        open_bytes(b"%PDF-1.4\nnothing else here\n".to_vec(), None),
        Err(Error::Format)
    ));
    assert!(matches!(open_bytes(Vec::new(), None), Err(Error::Format)));
}

// ============================================================================
// Passwords
// ============================================================================

#[test]
fn test_encrypted_document_needs_password() {
    init_logging();
    assert!(matches!(open_bytes(encrypted_pdf(2), None), Err(Error::Password)));
}

#[test]
fn test_encrypted_document_opens_with_user_password() {
    let doc = open_bytes(encrypted_pdf(2), Some(USER_PASSWORD)).unwrap();
    assert_eq!(doc.page_count().unwrap(), 2);
    assert_eq!(doc.page_size(1).unwrap(), (420.0, 595.0));
}

#[test]
fn test_encrypted_document_opens_with_owner_password() {
    let doc = open_bytes(encrypted_pdf(3), Some(OWNER_PASSWORD)).unwrap();
    assert_eq!(doc.page_count().unwrap(), 3);
}

#[test]
fn test_wrong_password_is_password_error() {
    assert!(matches!(
        open_bytes(encrypted_pdf(2), Some("not it")),
        Err(Error::Password)
    ));
}

#[test]
fn test_password_with_nul_is_rejected() {
    let source = CountingSource::new(encrypted_pdf(1));
    let (reads, closes) = (source.reads.clone(), source.closes.clone());
    assert!(matches!(
        pdf_x_bridge::open_source(Box::new(source), Some("se\0cret")),
        Err(Error::InvalidPassword)
    ));
    assert_eq!(reads.get(), 0);
    assert_eq!(closes.get(), 1);
}

// ============================================================================
// Page sizes
// ============================================================================

#[test]
fn test_page_sizes_follow_media_boxes() {
    let media_boxes = [LETTER, [0.0, 0.0, 595.0, 842.0], [10.0, 20.0, 110.0, 70.0]];
    let doc = open_bytes(simple_pdf(&media_boxes), None).unwrap();
    assert_eq!(doc.page_size(0).unwrap(), (612.0, 792.0));
    assert_eq!(doc.page_size(1).unwrap(), (595.0, 842.0));
    assert_eq!(doc.page_size(2).unwrap(), (100.0, 50.0));
}

#[test]
fn test_page_sizes_use_inherited_attributes() {
    let doc = open_bytes(inherited_attributes_pdf(), None).unwrap();
    assert_eq!(doc.page_count().unwrap(), 3);
    // Inherits the 200x100 box rotated by 90 degrees
    assert_eq!(doc.page_size(0).unwrap(), (100.0, 200.0));
    assert_eq!(doc.page_size(1).unwrap(), (300.0, 400.0));
    // -90 is 270
    assert_eq!(doc.page_size(2).unwrap(), (100.0, 200.0));
}

#[test]
fn test_page_index_out_of_range() {
    let doc = open_bytes(pdf_with_pages(3), None).unwrap();
    match doc.page_size(3) {
        Err(Error::PageIndex { index, count }) => assert_eq!((index, count), (3, 3)),
        other => panic!("expected PageIndex, got {other:?}"),
    }
    assert!(matches!(doc.page_size(usize::MAX), Err(Error::PageIndex { .. })));
}

#[test]
fn test_missing_page_object_is_page_error() {
    // /Count claims two pages but only one kid exists
    let mut writer = PdfWriter::new();
    writer.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    writer.object(2, "<< /Type /Pages /Kids [3 0 R] /Count 2 >>");
    writer.object(3, "<< /Type /Page /MediaBox [0 0 10 10] >>");
    let xref = writer.xref_table("/Size 4 /Root 1 0 R", true);
    writer.startxref(xref);

    let doc = open_bytes(writer.finish(), None).unwrap();
    assert_eq!(doc.page_count().unwrap(), 2);
    assert_eq!(doc.page_size(0).unwrap(), (10.0, 10.0));
    assert!(matches!(doc.page_size(1), Err(Error::PageNotFound { index: 1 })));
}

// ============================================================================
// Incremental reading
// ============================================================================

#[test]
fn test_large_document_reads_few_blocks() {
    init_logging();
    let data = padded_pdf(3, 4_000_000);

    let doc = OpenOptions::new()
        .block_size(4096)
        .max_cached_blocks(4)
        .open_source(Box::new(BufferSource::new(Cursor::new(data))))
        .unwrap();
    assert_eq!(doc.page_size(2).unwrap(), (612.0, 792.0));

    let stats = doc.block_stats().unwrap();
    assert!(stats.requests >= 2, "{stats:?}");
    assert!(stats.bytes < 64 * 1024, "read too much: {stats:?}");
    assert_eq!(stats.failures, 0);
}

#[test]
fn test_tiny_blocks_still_parse() {
    let doc = OpenOptions::new()
        .block_size(1)
        .max_cached_blocks(1)
        .open_source(Box::new(BufferSource::new(Cursor::new(xref_stream_pdf(2)))))
        .unwrap();
    assert_eq!(doc.page_count().unwrap(), 2);
    assert_eq!(doc.page_size(1).unwrap(), (595.0, 842.0));
}
