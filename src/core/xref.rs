use super::base_stream::BaseStream;
use super::decode::decode_stream;
use super::encryption::Decryptor;
use super::error::{PDFError, PDFResult};
use super::lexer::Lexer;
use super::parser::{Dict, PDFObject, Parser};
use super::stream::Stream;
use rustc_hash::{FxHashMap, FxHashSet};

/// How far from the end of the file `startxref` is searched for.
const STARTXREF_SEARCH_WINDOW: usize = 1024;

/// Cross-reference table entry.
///
/// Each entry in the xref table describes where to find an indirect object
/// in the PDF file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free entry - object number is available for reuse
    Free { next_free: u64, generation: u32 },

    /// Uncompressed entry - object is stored uncompressed at given offset
    Uncompressed { offset: u64, generation: u32 },

    /// Compressed entry - object is stored in an object stream
    Compressed { obj_stream_num: u32, index: u32 },
}

impl XRefEntry {
    /// Returns true if this entry is free.
    pub fn is_free(&self) -> bool {
        matches!(self, XRefEntry::Free { .. })
    }

    /// Returns the generation number for this entry.
    pub fn generation(&self) -> u32 {
        match self {
            XRefEntry::Free { generation, .. } => *generation,
            XRefEntry::Uncompressed { generation, .. } => *generation,
            XRefEntry::Compressed { .. } => 0,
        }
    }
}

/// Cross-reference data for a PDF document.
///
/// Maps object numbers to their locations in the file so that indirect
/// references (like "5 0 R") can be resolved on demand. Sections reached
/// through `/Prev` and `/XRefStm` are merged with the newest entry winning.
pub struct XRef {
    /// Entries keyed by object number. Sparse, since object numbers come
    /// straight from the file.
    entries: FxHashMap<u32, XRefEntry>,

    /// Cache of parsed objects (object number -> PDFObject)
    cache: FxHashMap<u32, PDFObject>,

    /// Merged trailer dictionary
    trailer: Option<Dict>,

    /// Stream to read PDF data from
    stream: Box<dyn BaseStream>,

    decryptor: Option<Decryptor>,

    /// Object numbers currently being fetched, for cycle detection
    fetching: FxHashSet<u32>,
}

impl XRef {
    /// Creates a new XRef table.
    pub fn new(stream: Box<dyn BaseStream>) -> Self {
        XRef {
            entries: FxHashMap::default(),
            cache: FxHashMap::default(),
            trailer: None,
            stream,
            decryptor: None,
            fetching: FxHashSet::default(),
        }
    }

    /// Finds the offset named by the last `startxref` keyword.
    pub fn find_startxref(&mut self) -> PDFResult<usize> {
        let end = self.stream.end();
        let tail_start = end.saturating_sub(STARTXREF_SEARCH_WINDOW).max(self.stream.start());
        let tail = self.stream.get_byte_range(tail_start, end)?;

        let keyword = b"startxref";
        let found = tail
            .windows(keyword.len())
            .rposition(|w| w == keyword)
            .ok_or_else(|| PDFError::parse("startxref not found"))?;

        let digits: Vec<u8> = tail[found + keyword.len()..]
            .iter()
            .copied()
            .skip_while(|&b| Lexer::is_whitespace(b))
            .take_while(u8::is_ascii_digit)
            .collect();

        let offset = std::str::from_utf8(&digits)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| PDFError::parse("startxref is not followed by an offset"))?;

        if offset >= end {
            return Err(PDFError::InvalidPosition {
                pos: offset,
                length: end,
            });
        }
        Ok(offset)
    }

    /// Parses every cross-reference section reachable from `startxref`.
    pub fn parse(&mut self, startxref: usize) -> PDFResult<()> {
        let mut visited = FxHashSet::default();
        let mut next = Some(startxref);

        while let Some(offset) = next.take() {
            if !visited.insert(offset) {
                log::warn!("xref /Prev chain loops back to offset {offset}, stopping");
                break;
            }

            let trailer = self.parse_section(offset, &mut visited)?;
            next = trailer
                .get("Prev")
                .and_then(PDFObject::as_int)
                .and_then(|prev| usize::try_from(prev).ok());
            self.merge_trailer(trailer);
        }

        if self.trailer.is_none() {
            return Err(PDFError::parse("No trailer dictionary"));
        }
        Ok(())
    }

    /// Parses the section at `offset`, either a classic table or an xref
    /// stream, and returns its trailer dictionary.
    fn parse_section(&mut self, offset: usize, visited: &mut FxHashSet<usize>) -> PDFResult<Dict> {
        let mut parser = self.parser_at(offset)?;

        match parser.get_object()? {
            obj if obj.is_command("xref") => {
                let mut section = Vec::new();
                Self::read_xref_table(&mut parser, &mut section)?;

                let trailer = match parser.get_object()? {
                    PDFObject::Dictionary(dict) => dict,
                    other => {
                        return Err(PDFError::parse(format!(
                            "Expected trailer dictionary, got {:?}",
                            other
                        )));
                    }
                };

                // Hybrid files: the stream's entries take precedence over
                // this table's.
                if let Some(stm) = trailer
                    .get("XRefStm")
                    .and_then(PDFObject::as_int)
                    .and_then(|pos| usize::try_from(pos).ok())
                {
                    if visited.insert(stm) {
                        match self.parse_section(stm, visited) {
                            Ok(_) => {}
                            Err(e @ PDFError::BlockRead { .. }) => return Err(e),
                            Err(e) => log::warn!("ignoring broken /XRefStm at {stm}: {e}"),
                        }
                    }
                }

                for (num, entry) in section {
                    self.set_entry(num, entry);
                }
                Ok(trailer)
            }
            PDFObject::Number(_) => {
                let (dict, data) = Self::read_indirect_stream(&mut parser)?;
                if dict.get("Type").and_then(PDFObject::as_name) != Some("XRef") {
                    return Err(PDFError::parse(format!(
                        "Object at {} is not an xref stream",
                        offset
                    )));
                }
                self.read_xref_stream(&dict, &data)?;
                Ok(dict)
            }
            other => Err(PDFError::parse(format!(
                "Expected 'xref' or an xref stream at {}, got {:?}",
                offset, other
            ))),
        }
    }

    /// Reads xref table subsections up to and including the `trailer` keyword.
    ///
    /// Each subsection starts with two numbers: first object number and count.
    /// Then follows one entry per line with: offset generation_number type
    fn read_xref_table(parser: &mut Parser, section: &mut Vec<(u32, XRefEntry)>) -> PDFResult<()> {
        loop {
            let first_obj = parser.get_object()?;

            if first_obj.is_command("trailer") {
                return Ok(());
            }

            let first = first_obj.as_int().ok_or_else(|| {
                PDFError::parse(format!(
                    "Expected subsection start number or 'trailer', got {:?}",
                    first_obj
                ))
            })?;
            let count_obj = parser.get_object()?;
            let count = count_obj.as_int().ok_or_else(|| {
                PDFError::parse(format!("Expected subsection count, got {:?}", count_obj))
            })?;
            if first < 0 || count < 0 {
                return Err(PDFError::parse("Negative xref subsection bounds"));
            }

            for i in 0..count {
                let entry = Self::read_xref_entry(parser)?;
                let num = first
                    .checked_add(i)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| PDFError::parse("Object number out of range"))?;
                section.push((num, entry));
            }
        }
    }

    /// Reads a single xref entry.
    ///
    /// Format: offset generation type
    /// Example: 0000000015 00000 n
    fn read_xref_entry(parser: &mut Parser) -> PDFResult<XRefEntry> {
        let offset_obj = parser.get_object()?;
        let offset = offset_obj
            .as_int()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| {
                PDFError::parse(format!("Expected offset in xref entry, got {:?}", offset_obj))
            })?;

        let gen_obj = parser.get_object()?;
        let generation = gen_obj
            .as_int()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                PDFError::parse(format!("Expected generation in xref entry, got {:?}", gen_obj))
            })?;

        let type_obj = parser.get_object()?;
        if type_obj.is_command("f") {
            Ok(XRefEntry::Free {
                next_free: offset,
                generation,
            })
        } else if type_obj.is_command("n") {
            Ok(XRefEntry::Uncompressed { offset, generation })
        } else {
            Err(PDFError::parse(format!(
                "Expected 'f' or 'n' in xref entry, got {:?}",
                type_obj
            )))
        }
    }

    /// Decodes the binary entries of a cross-reference stream.
    fn read_xref_stream(&mut self, dict: &Dict, data: &[u8]) -> PDFResult<()> {
        let data = decode_stream(dict, data)?;

        let widths: Vec<usize> = dict
            .get("W")
            .and_then(PDFObject::as_array)
            .map(|w| w.iter().filter_map(PDFObject::as_int).map(|n| n.max(0) as usize).collect())
            .unwrap_or_default();
        if widths.len() != 3 || widths.iter().any(|&w| w > 8) {
            return Err(PDFError::parse("Invalid /W in xref stream"));
        }

        let size = dict.get("Size").and_then(PDFObject::as_int).unwrap_or(0).max(0);
        let index: Vec<i64> = match dict.get("Index").and_then(PDFObject::as_array) {
            Some(items) => items.iter().filter_map(PDFObject::as_int).collect(),
            None => vec![0, size],
        };

        let entry_len: usize = widths.iter().sum();
        if entry_len == 0 {
            return Err(PDFError::parse("Empty xref stream entries"));
        }
        let mut rows = data.chunks_exact(entry_len);

        for pair in index.chunks_exact(2) {
            let (first, count) = (pair[0].max(0), pair[1].max(0));
            for i in 0..count {
                let row = match rows.next() {
                    Some(row) => row,
                    None => {
                        log::warn!("xref stream data ends before /Index is exhausted");
                        return Ok(());
                    }
                };

                let (type_field, rest) = row.split_at(widths[0]);
                let (field2, field3) = rest.split_at(widths[1]);
                let entry_type = if widths[0] == 0 { 1 } else { be_number(type_field) };

                let Some(num) = first.checked_add(i).and_then(|n| u32::try_from(n).ok()) else {
                    continue;
                };
                let entry = match entry_type {
                    0 => XRefEntry::Free {
                        next_free: be_number(field2),
                        generation: be_number(field3) as u32,
                    },
                    1 => XRefEntry::Uncompressed {
                        offset: be_number(field2),
                        generation: be_number(field3) as u32,
                    },
                    2 => XRefEntry::Compressed {
                        obj_stream_num: be_number(field2) as u32,
                        index: be_number(field3) as u32,
                    },
                    // Unknown types are treated as references to the null object
                    _ => continue,
                };
                self.set_entry(num, entry);
            }
        }

        Ok(())
    }

    /// Records an entry unless a newer section already provided one.
    fn set_entry(&mut self, num: u32, entry: XRefEntry) {
        self.entries.entry(num).or_insert(entry);
    }

    /// Adds keys of an older trailer that the newer ones lack.
    fn merge_trailer(&mut self, older: Dict) {
        match &mut self.trailer {
            None => self.trailer = Some(older),
            Some(trailer) => {
                for (key, value) in older {
                    trailer.entry(key).or_insert(value);
                }
            }
        }
    }

    fn parser_at(&self, offset: usize) -> PDFResult<Parser> {
        if offset < self.stream.start() || offset >= self.stream.end() {
            return Err(PDFError::InvalidPosition {
                pos: offset,
                length: self.stream.length(),
            });
        }
        let sub = self
            .stream
            .make_sub_stream(offset, self.stream.end() - offset)?;
        Parser::new(Lexer::new(sub)?)
    }

    /// Reads `G obj << ... >> stream` after the object number has been consumed.
    fn read_indirect_stream(parser: &mut Parser) -> PDFResult<(Dict, Vec<u8>)> {
        parser.get_object()?;
        if !parser.get_object()?.is_command("obj") {
            return Err(PDFError::parse("Expected 'obj' keyword"));
        }
        match parser.get_object()? {
            PDFObject::Stream { dict, data } => Ok((dict, data)),
            other => Err(PDFError::parse(format!("Expected stream object, got {:?}", other))),
        }
    }

    /// Rebuilds the table by scanning the whole file for `N G obj` headers
    /// and `trailer` dictionaries.
    pub fn rebuild(&mut self) -> PDFResult<()> {
        let data = self
            .stream
            .get_byte_range(self.stream.start(), self.stream.end())?;
        let base = self.stream.start();

        self.entries.clear();
        self.cache.clear();
        self.trailer = None;

        let mut found: FxHashMap<u32, (u64, u32)> = FxHashMap::default();
        for (pos, num, generation) in scan_object_headers(&data) {
            // Later definitions in the file belong to newer updates
            found.insert(num, ((base + pos) as u64, generation));
        }
        if found.is_empty() {
            return Err(PDFError::parse("No objects found while rebuilding xref"));
        }
        for (&num, &(offset, generation)) in &found {
            self.set_entry(num, XRefEntry::Uncompressed { offset, generation });
        }

        let mut trailers = Vec::new();
        let keyword = b"trailer";
        let mut from = 0;
        while let Some(hit) = find(&data[from..], keyword) {
            let at = from + hit;
            from = at + keyword.len();
            match self.parser_at(base + from) {
                Ok(mut parser) => match parser.get_object() {
                    Ok(PDFObject::Dictionary(dict)) => trailers.push(dict),
                    Ok(_) => {}
                    Err(e) => log::warn!("skipping unreadable trailer at {}: {e}", base + at),
                },
                Err(e) => log::warn!("skipping unreadable trailer at {}: {e}", base + at),
            }
        }
        for trailer in trailers.into_iter().rev() {
            self.merge_trailer(trailer);
        }

        self.index_object_streams(&found)?;

        let has_root = self
            .trailer
            .as_ref()
            .is_some_and(|t| t.contains_key("Root"));
        if !has_root {
            self.find_catalog(&found)?;
        }

        log::warn!("rebuilt xref from {} object headers", found.len());
        Ok(())
    }

    /// Registers the contents of object streams found during a rebuild.
    fn index_object_streams(&mut self, found: &FxHashMap<u32, (u64, u32)>) -> PDFResult<()> {
        let mut streams: Vec<u32> = found.keys().copied().collect();
        streams.sort_unstable();

        for num in streams {
            let generation = found[&num].1;
            let obj = match self.fetch(num, generation) {
                Ok(obj) => obj,
                Err(e @ PDFError::BlockRead { .. }) => return Err(e),
                Err(_) => continue,
            };
            if obj.get("Type").and_then(PDFObject::as_name) != Some("ObjStm") {
                continue;
            }
            let Ok((header, _)) = self.object_stream_contents(num, &obj) else {
                continue;
            };
            for (index, (inner, _)) in header.iter().enumerate() {
                self.set_entry(
                    *inner,
                    XRefEntry::Compressed {
                        obj_stream_num: num,
                        index: index as u32,
                    },
                );
            }
        }
        Ok(())
    }

    /// Looks for a `/Type /Catalog` object when no trailer names the root.
    fn find_catalog(&mut self, found: &FxHashMap<u32, (u64, u32)>) -> PDFResult<()> {
        let mut candidates: Vec<u32> = self.entries.keys().copied().collect();
        candidates.sort_unstable();

        for num in candidates {
            let generation = found.get(&num).map_or(0, |(_, g)| *g);
            match self.fetch(num, generation) {
                Ok(obj) if obj.get("Type").and_then(PDFObject::as_name) == Some("Catalog") => {
                    let trailer = self.trailer.get_or_insert_with(Dict::default);
                    trailer.insert("Root".to_string(), PDFObject::Ref { num, generation });
                    return Ok(());
                }
                Err(e @ PDFError::BlockRead { .. }) => return Err(e),
                _ => {}
            }
        }
        Err(PDFError::parse("No document catalog found while rebuilding xref"))
    }

    /// Installs the handler used to decrypt streams fetched from now on.
    pub fn set_decryptor(&mut self, decryptor: Decryptor) {
        self.cache.clear();
        self.decryptor = Some(decryptor);
    }

    /// Gets an entry from the xref table.
    pub fn get_entry(&self, obj_num: u32) -> Option<&XRefEntry> {
        self.entries.get(&obj_num)
    }

    /// Fetches an indirect object by reference.
    ///
    /// References to free or unknown objects resolve to null. The object is
    /// cached after being parsed.
    pub fn fetch(&mut self, obj_num: u32, generation: u32) -> PDFResult<PDFObject> {
        if let Some(cached) = self.cache.get(&obj_num) {
            return Ok(cached.clone());
        }

        let entry = match self.get_entry(obj_num) {
            Some(entry) => entry.clone(),
            None => return Ok(PDFObject::Null),
        };

        if !self.fetching.insert(obj_num) {
            return Err(PDFError::parse(format!(
                "Circular reference while fetching object {}",
                obj_num
            )));
        }
        let result = match entry {
            XRefEntry::Free { .. } => Ok(PDFObject::Null),
            XRefEntry::Uncompressed { offset, .. } => {
                self.fetch_uncompressed(obj_num, generation, offset as usize)
            }
            XRefEntry::Compressed {
                obj_stream_num,
                index,
            } => self.fetch_compressed(obj_num, obj_stream_num, index as usize),
        };
        self.fetching.remove(&obj_num);

        let object = result?;
        self.cache.insert(obj_num, object.clone());
        Ok(object)
    }

    fn fetch_uncompressed(
        &mut self,
        obj_num: u32,
        generation: u32,
        offset: usize,
    ) -> PDFResult<PDFObject> {
        let mut parser = self.parser_at(offset)?;

        let parsed_num = parser.get_object()?.as_int();
        if parsed_num != Some(obj_num as i64) {
            return Err(PDFError::parse(format!(
                "Object number mismatch at offset {}: expected {}, got {:?}",
                offset, obj_num, parsed_num
            )));
        }

        let parsed_gen = parser.get_object()?.as_int();
        if parsed_gen != Some(generation as i64) {
            log::warn!(
                "generation mismatch for object {}: expected {}, got {:?}",
                obj_num,
                generation,
                parsed_gen
            );
        }

        if !parser.get_object()?.is_command("obj") {
            return Err(PDFError::parse(format!(
                "Expected 'obj' keyword for object {}",
                obj_num
            )));
        }

        let object = parser.get_object()?;
        Ok(match (object, &self.decryptor) {
            (PDFObject::Stream { dict, data }, Some(decryptor))
                if dict.get("Type").and_then(PDFObject::as_name) != Some("XRef") =>
            {
                let data = decryptor.decrypt_stream(&data, obj_num, generation);
                PDFObject::Stream { dict, data }
            }
            (object, _) => object,
        })
    }

    fn fetch_compressed(
        &mut self,
        obj_num: u32,
        stream_num: u32,
        index: usize,
    ) -> PDFResult<PDFObject> {
        let container = self.fetch(stream_num, 0)?;
        let (header, objects) = self.object_stream_contents(stream_num, &container)?;

        let mut wanted = None;
        for (i, ((num, _), obj)) in header.into_iter().zip(objects).enumerate() {
            if i == index {
                if num != obj_num {
                    log::warn!(
                        "object stream {stream_num} index {index} holds {num}, not {obj_num}"
                    );
                }
                wanted = Some(obj);
            } else if !self.cache.contains_key(&num)
                && self.get_entry(num)
                    == Some(&XRefEntry::Compressed {
                        obj_stream_num: stream_num,
                        index: i as u32,
                    })
            {
                self.cache.insert(num, obj);
            }
        }

        wanted.ok_or_else(|| {
            PDFError::parse(format!(
                "Object stream {} has no object at index {}",
                stream_num, index
            ))
        })
    }

    /// Decodes an object stream into its `(number, offset)` header and objects.
    #[allow(clippy::type_complexity)]
    fn object_stream_contents(
        &self,
        stream_num: u32,
        container: &PDFObject,
    ) -> PDFResult<(Vec<(u32, usize)>, Vec<PDFObject>)> {
        let (dict, data) = match container {
            PDFObject::Stream { dict, data } => (dict, data),
            _ => {
                return Err(PDFError::parse(format!(
                    "Object {} is not an object stream",
                    stream_num
                )));
            }
        };
        let int = |key: &str| dict.get(key).and_then(PDFObject::as_int).filter(|n| *n >= 0);
        let count = int("N").ok_or_else(|| PDFError::parse("Object stream without /N"))? as usize;
        let first = int("First")
            .ok_or_else(|| PDFError::parse("Object stream without /First"))?
            as usize;

        let decoded = Stream::from_bytes(decode_stream(dict, data)?);
        let mut parser = Parser::new(Lexer::new(decoded.make_sub_stream(0, decoded.length())?)?)?;

        let mut header = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let num = parser.get_object()?.as_int();
            let offset = parser.get_object()?.as_int();
            match (num, offset) {
                (Some(num), Some(offset)) if num >= 0 && offset >= 0 => {
                    header.push((num as u32, offset as usize));
                }
                _ => return Err(PDFError::parse("Malformed object stream header")),
            }
        }

        let mut objects = Vec::with_capacity(header.len());
        for &(_, offset) in &header {
            let start = first + offset;
            let object = if start < decoded.length() {
                let sub = decoded.make_sub_stream(start, decoded.length() - start)?;
                Parser::new(Lexer::new(sub)?)?.get_object()?
            } else {
                PDFObject::Null
            };
            objects.push(object);
        }

        Ok((header, objects))
    }

    /// Fetches an object if it's a reference, otherwise returns the object as-is.
    pub fn fetch_if_ref(&mut self, obj: &PDFObject) -> PDFResult<PDFObject> {
        match obj {
            PDFObject::Ref { num, generation } => self.fetch(*num, *generation),
            _ => Ok(obj.clone()),
        }
    }

    /// Returns the trailer dictionary.
    pub fn trailer(&self) -> Option<&Dict> {
        self.trailer.as_ref()
    }

    /// Returns the catalog (root) dictionary.
    pub fn catalog(&mut self) -> PDFResult<Dict> {
        let root_ref = self
            .trailer
            .as_ref()
            .and_then(|t| t.get("Root"))
            .cloned()
            .ok_or_else(|| PDFError::parse("No Root entry in trailer"))?;

        match self.fetch_if_ref(&root_ref)? {
            PDFObject::Dictionary(dict) => Ok(dict),
            other => Err(PDFError::parse(format!("Catalog is not a dictionary: {:?}", other))),
        }
    }

    /// Number of object numbers with an entry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the xref table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Big-endian integer of up to eight bytes.
fn be_number(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Finds every `N G obj` header in `data`, returning `(offset, N, G)`.
fn scan_object_headers(data: &[u8]) -> Vec<(usize, u32, u32)> {
    let is_ws = Lexer::is_whitespace;
    let mut headers = Vec::new();
    let mut from = 0;

    while let Some(hit) = find(&data[from..], b"obj") {
        let at = from + hit;
        from = at + 3;

        // Reject `endobj` and keywords that merely start with "obj"
        if data.get(at + 3).is_some_and(|b| b.is_ascii_alphanumeric()) {
            continue;
        }

        let skip_ws = |mut i: usize| {
            while i > 0 && is_ws(data[i - 1]) {
                i -= 1;
            }
            i
        };
        let skip_digits = |mut i: usize| {
            while i > 0 && data[i - 1].is_ascii_digit() {
                i -= 1;
            }
            i
        };

        let gen_end = skip_ws(at);
        if gen_end == at {
            continue;
        }
        let gen_start = skip_digits(gen_end);
        let num_end = skip_ws(gen_start);
        if gen_start == gen_end || num_end == gen_start {
            continue;
        }
        let num_start = skip_digits(num_end);
        if num_start == num_end || (num_start > 0 && !is_ws(data[num_start - 1])) {
            continue;
        }

        let parse = |s: &[u8]| std::str::from_utf8(s).ok()?.parse::<u32>().ok();
        if let (Some(num), Some(generation)) =
            (parse(&data[num_start..num_end]), parse(&data[gen_start..gen_end]))
        {
            headers.push((num_start, num, generation));
        }
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xref_for(data: &[u8]) -> XRef {
        XRef::new(Box::new(Stream::from_bytes(data.to_vec())))
    }

    #[test]
    fn test_xref_entry_is_free() {
        let free_entry = XRefEntry::Free {
            next_free: 0,
            generation: 65535,
        };
        assert!(free_entry.is_free());
        assert_eq!(free_entry.generation(), 65535);

        let uncompressed_entry = XRefEntry::Uncompressed {
            offset: 100,
            generation: 5,
        };
        assert!(!uncompressed_entry.is_free());
        assert_eq!(uncompressed_entry.generation(), 5);
    }

    #[test]
    fn test_parse_xref_with_multiple_entries() {
        let data = b"xref\n\
            0 3\n\
            0000000000 65535 f\n\
            0000000015 00000 n\n\
            0000000079 00000 n\n\
            trailer\n\
            << /Size 3 >>\n";

        let mut xref = xref_for(data);
        xref.parse(0).unwrap();

        assert_eq!(xref.len(), 3);
        assert!(xref.get_entry(0).unwrap().is_free());
        assert_eq!(
            xref.get_entry(2),
            Some(&XRefEntry::Uncompressed {
                offset: 79,
                generation: 0
            })
        );
        assert!(xref.trailer().unwrap().contains_key("Size"));
    }

    #[test]
    fn test_fetch_indirect_object() {
        let data = b"1 0 obj\n\
            42\n\
            endobj\n\
            xref\n\
            0 2\n\
            0000000000 65535 f\n\
            0000000000 00000 n\n\
            trailer\n\
            << /Size 2 >>\n\
            startxref\n\
            18\n\
            %%EOF";

        let mut xref = xref_for(data);
        let start = xref.find_startxref().unwrap();
        assert_eq!(start, 18);
        xref.parse(start).unwrap();

        assert_eq!(xref.fetch(1, 0).unwrap(), PDFObject::Number(42.0));
        let reference = PDFObject::Ref {
            num: 1,
            generation: 0,
        };
        assert_eq!(xref.fetch_if_ref(&reference).unwrap(), PDFObject::Number(42.0));
        // Free and unknown objects are null
        assert_eq!(xref.fetch(0, 65535).unwrap(), PDFObject::Null);
        assert_eq!(xref.fetch(9, 0).unwrap(), PDFObject::Null);
    }

    #[test]
    fn test_prev_chain_newest_entry_wins() {
        let mut data = Vec::new();
        data.extend_from_slice(b"1 0 obj 1 endobj\n");
        let second = data.len();
        data.extend_from_slice(b"1 0 obj 2 endobj\n");
        let old_xref = data.len();
        data.extend_from_slice(
            b"xref\n0 2\n0000000000 65535 f \n0000000000 00000 n \n\
              trailer\n<< /Size 2 /Root 1 0 R >>\n",
        );
        let new_xref = data.len();
        data.extend_from_slice(
            format!(
                "xref\n1 1\n{:010} 00000 n \ntrailer\n<< /Size 2 /Prev {} >>\n",
                second, old_xref
            )
            .as_bytes(),
        );

        let mut xref = xref_for(&data);
        xref.parse(new_xref).unwrap();

        assert_eq!(xref.fetch(1, 0).unwrap(), PDFObject::Number(2.0));
        // Root only appears in the older trailer
        assert!(xref.trailer().unwrap().contains_key("Root"));
    }

    #[test]
    fn test_prev_cycle_is_detected() {
        let data = b"xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 /Prev 0 >>\n";
        let mut xref = xref_for(data);
        xref.parse(0).unwrap();
        assert_eq!(xref.len(), 1);
    }

    #[test]
    fn test_huge_object_numbers_stay_sparse() {
        let data = b"xref\n0 1\n0000000000 65535 f \n4000000000 1\n0000000009 00000 n \n\
            trailer\n<< /Size 1 >>\n";
        let mut xref = xref_for(data);
        xref.parse(0).unwrap();

        assert_eq!(xref.len(), 2);
        assert!(xref.get_entry(4_000_000_000).is_some());

        // Past u32 the subsection is rejected
        let data = b"xref\n4294967295 2\n0000000000 65535 f \n0000000009 00000 n \n\
            trailer\n<< >>\n";
        assert!(xref_for(data).parse(0).is_err());
    }

    #[test]
    fn test_scan_object_headers() {
        let data = b"%PDF-1.4\n1 0 obj\n<< >>\nendobj\n12 3 obj 5 endobj x1 0 obj";
        let headers = scan_object_headers(data);
        assert_eq!(headers, vec![(9, 1, 0), (30, 12, 3)]);
    }

    #[test]
    fn test_rebuild_finds_objects_and_trailer() {
        let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n\
            trailer\n<< /Root 1 0 R >>\nstartxref\n999999\n%%EOF";

        let mut xref = xref_for(data);
        assert!(xref.find_startxref().is_err());
        xref.rebuild().unwrap();

        let catalog = xref.catalog().unwrap();
        assert_eq!(catalog.get("Type").and_then(PDFObject::as_name), Some("Catalog"));
    }

    #[test]
    fn test_rebuild_without_trailer_finds_catalog() {
        let data = b"%PDF-1.7\n3 0 obj\n<< /Type /Catalog /Pages 4 0 R >>\nendobj\n";
        let mut xref = xref_for(data);
        xref.rebuild().unwrap();
        assert!(xref.catalog().is_ok());
    }

    #[test]
    fn test_be_number() {
        assert_eq!(be_number(&[]), 0);
        assert_eq!(be_number(&[0x01, 0x00]), 256);
        assert_eq!(be_number(&[0xff]), 255);
    }
}
