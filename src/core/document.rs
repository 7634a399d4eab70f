use super::base_stream::BaseStream;
use super::encryption::StandardSecurity;
use super::error::{PDFError, PDFResult};
use super::page::PageTree;
use super::parser::PDFObject;
use super::xref::XRef;

/// How far into the file the `%PDF-` header may start.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// PDF Document reader.
///
/// Parses the document structure lazily: opening reads the header, the
/// cross-reference data, the catalog and the root of the page tree. Page
/// dictionaries are only fetched when a page is asked for.
pub struct PDFDocument {
    /// The cross-reference table
    xref: XRef,

    pages: PageTree,

    /// Whether the xref had to be rebuilt by scanning the file
    repaired: bool,
}

impl PDFDocument {
    /// Opens a PDF document from `stream`.
    ///
    /// `password` is tried as the user password and then as the owner
    /// password when the document is encrypted. A missing password is the
    /// empty password.
    pub fn open(mut stream: Box<dyn BaseStream>, password: Option<&[u8]>) -> PDFResult<Self> {
        Self::check_header(stream.as_mut())?;

        let mut xref = XRef::new(stream);
        let mut repaired = false;

        if let Err(e) = Self::load_xref(&mut xref) {
            Self::recoverable(e)?;
            xref.rebuild()?;
            repaired = true;
        }

        Self::setup_security(&mut xref, password.unwrap_or_default())?;

        let pages = match Self::load_pages(&mut xref) {
            Ok(loaded) => loaded,
            Err(e) if !repaired => {
                Self::recoverable(e)?;
                xref.rebuild()?;
                repaired = true;
                Self::load_pages(&mut xref)?
            }
            Err(e) => return Err(e),
        };

        log::debug!(
            "opened document: {} xref entries, {} pages{}",
            xref.len(),
            pages.count(),
            if repaired { ", xref rebuilt" } else { "" }
        );

        Ok(PDFDocument {
            xref,
            pages,
            repaired,
        })
    }

    /// Requires `%PDF-` near the start of the file.
    fn check_header(stream: &mut dyn BaseStream) -> PDFResult<()> {
        let start = stream.start();
        let end = stream.end().min(start + HEADER_SEARCH_WINDOW);
        let head = stream.get_byte_range(start, end)?;

        if head.windows(5).any(|w| w == b"%PDF-") {
            Ok(())
        } else {
            Err(PDFError::parse("No %PDF- header found"))
        }
    }

    fn load_xref(xref: &mut XRef) -> PDFResult<()> {
        let startxref = xref.find_startxref()?;
        xref.parse(startxref)
    }

    fn load_pages(xref: &mut XRef) -> PDFResult<PageTree> {
        let catalog = xref.catalog()?;
        PageTree::new(&catalog, xref)
    }

    /// Lets structural errors through to a rebuild and stops on everything
    /// else.
    fn recoverable(error: PDFError) -> PDFResult<()> {
        match error {
            PDFError::BlockRead { .. }
            | PDFError::Password
            | PDFError::UnsupportedSecurity(_) => Err(error),
            other => {
                log::warn!("cross-reference data is broken ({other}), rebuilding");
                Ok(())
            }
        }
    }

    fn setup_security(xref: &mut XRef, password: &[u8]) -> PDFResult<()> {
        let Some(trailer) = xref.trailer() else {
            return Ok(());
        };
        let Some(encrypt) = trailer.get("Encrypt").cloned() else {
            return Ok(());
        };
        let file_id = trailer
            .get("ID")
            .and_then(PDFObject::as_array)
            .and_then(|ids| ids.first())
            .and_then(PDFObject::as_bytes)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();

        let encrypt = xref.fetch_if_ref(&encrypt)?;
        let dict = encrypt
            .as_dict()
            .ok_or_else(|| PDFError::parse("/Encrypt is not a dictionary"))?;

        let security = StandardSecurity::from_dict(dict, &file_id)?;
        log::debug!(
            "document is encrypted: V{} R{}, {}-bit key",
            security.version,
            security.revision,
            security.key_length * 8
        );
        let decryptor = security.authenticate(password)?;
        xref.set_decryptor(decryptor);
        Ok(())
    }

    /// Page count as recorded in the page tree, possibly zero or negative.
    pub fn page_count(&self) -> i32 {
        self.pages.count()
    }

    /// Size in points of page `index` with rotation applied.
    pub fn page_size(&mut self, index: usize) -> PDFResult<(f64, f64)> {
        let in_range = usize::try_from(self.pages.count()).is_ok_and(|count| index < count);
        if !in_range {
            return Err(PDFError::PageNotFound { index });
        }
        Ok(self.pages.get_page(&mut self.xref, index)?.size())
    }

    /// Returns a reference to the XRef table.
    pub fn xref(&self) -> &XRef {
        &self.xref
    }

    /// True when the cross-reference data was rebuilt by scanning the file.
    pub fn was_repaired(&self) -> bool {
        self.repaired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Stream;

    fn build(objects: &[&str]) -> Vec<u8> {
        let mut data = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(data.len());
            data.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref = data.len();
        data.extend_from_slice(
            format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes(),
        );
        for offset in offsets {
            data.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        data.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref
            )
            .as_bytes(),
        );
        data
    }

    fn open(data: Vec<u8>) -> PDFResult<PDFDocument> {
        PDFDocument::open(Box::new(Stream::from_bytes(data)), None)
    }

    #[test]
    fn test_open_two_pages() {
        let data = build(&[
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 /MediaBox [0 0 200 100] >>",
            "<< /Type /Page /Parent 2 0 R >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 300 400] /Rotate 90 >>",
        ]);
        let mut doc = open(data).unwrap();

        assert_eq!(doc.page_count(), 2);
        assert!(!doc.was_repaired());
        assert_eq!(doc.page_size(0).unwrap(), (200.0, 100.0));
        assert_eq!(doc.page_size(1).unwrap(), (400.0, 300.0));
        assert!(matches!(doc.page_size(2), Err(PDFError::PageNotFound { index: 2 })));
    }

    #[test]
    fn test_zero_count_is_reported() {
        let data = build(&[
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [] /Count 0 >>",
        ]);
        let doc = open(data).unwrap();
        assert_eq!(doc.page_count(), 0);
    }

    #[test]
    fn test_missing_header_is_format_error() {
        let err = open(b"hello world".to_vec()).err().unwrap();
        assert!(matches!(err, PDFError::Parse(_)));
    }

    #[test]
    fn test_broken_startxref_is_repaired() {
        let mut data = build(&[
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Page >>",
        ]);
        let at = data.windows(9).rposition(|w| w == b"startxref").unwrap();
        data.truncate(at);
        data.extend_from_slice(b"startxref\n7\n%%EOF\n");

        let mut doc = open(data).unwrap();
        assert!(doc.was_repaired());
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.page_size(0).unwrap(), (612.0, 792.0));
    }
}
