use super::error::{PDFError, PDFResult};
use super::parser::{Dict, PDFObject};
use super::xref::XRef;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Page size used when no usable `/MediaBox` is found (US Letter).
pub const DEFAULT_PAGE_SIZE: (f64, f64) = (612.0, 792.0);

/// Upper bound on the number of nodes visited while counting leaves.
const MAX_TREE_NODES: usize = 1 << 20;

/// Attributes a page inherits from its ancestors.
#[derive(Debug, Clone, Default)]
struct Inherited {
    media_box: Option<PDFObject>,
    rotate: Option<PDFObject>,
}

impl Inherited {
    fn absorb(&mut self, node: &Dict) {
        if let Some(media_box) = node.get("MediaBox") {
            self.media_box = Some(media_box.clone());
        }
        if let Some(rotate) = node.get("Rotate") {
            self.rotate = Some(rotate.clone());
        }
    }
}

/// A located page, reduced to the attributes resolved from the page tree
/// so the size can be answered without touching the file again.
#[derive(Debug, Clone)]
pub struct Page {
    /// `[llx, lly, urx, ury]`
    media_box: Option<[f64; 4]>,

    /// Clockwise rotation in degrees, normalised to 0, 90, 180 or 270
    rotate: i64,
}

impl Page {
    /// Width and height in points as displayed, i.e. with `/Rotate` applied.
    pub fn size(&self) -> (f64, f64) {
        let (width, height) = match self.media_box {
            Some([llx, lly, urx, ury]) => ((urx - llx).abs(), (ury - lly).abs()),
            None => DEFAULT_PAGE_SIZE,
        };
        if self.rotate % 180 == 90 {
            (height, width)
        } else {
            (width, height)
        }
    }
}

/// The document's page tree.
///
/// Pages are located on demand by walking `/Kids`, skipping whole subtrees by
/// their `/Count`. Located pages are cached by index.
#[derive(Debug)]
pub struct PageTree {
    root: PDFObject,
    count: i32,
    pages: FxHashMap<usize, Page>,
}

impl PageTree {
    /// Resolves the catalog's `/Pages` node and reads the page count.
    ///
    /// The count is taken verbatim from the root `/Count`, so broken files
    /// can report zero or a negative number. Without a `/Count` the leaves are
    /// counted.
    pub fn new(catalog: &Dict, xref: &mut XRef) -> PDFResult<Self> {
        let root = catalog
            .get("Pages")
            .cloned()
            .ok_or_else(|| PDFError::parse("Catalog has no /Pages entry"))?;
        let root_dict = match xref.fetch_if_ref(&root)? {
            PDFObject::Dictionary(dict) => dict,
            other => {
                return Err(PDFError::parse(format!(
                    "/Pages is not a dictionary: {:?}",
                    other
                )));
            }
        };

        let count = match root_dict.get("Count") {
            Some(count) => match xref.fetch_if_ref(count)?.as_number() {
                Some(n) => n.clamp(i32::MIN as f64, i32::MAX as f64) as i32,
                None => return Err(PDFError::parse("/Count is not a number")),
            },
            None => {
                log::warn!("page tree root has no /Count, counting leaves");
                count_leaves(&root, xref)?
            }
        };

        log::debug!("page tree reports {} pages", count);
        Ok(PageTree {
            root,
            count,
            pages: FxHashMap::default(),
        })
    }

    pub fn count(&self) -> i32 {
        self.count
    }

    /// Locates page `index`, fetching only the nodes on the way to it.
    pub fn get_page(&mut self, xref: &mut XRef, index: usize) -> PDFResult<&Page> {
        if !self.pages.contains_key(&index) {
            let page = self.find_page(xref, index)?;
            self.pages.insert(index, page);
        }
        self.pages
            .get(&index)
            .ok_or(PDFError::PageNotFound { index })
    }

    fn find_page(&self, xref: &mut XRef, index: usize) -> PDFResult<Page> {
        let not_found = PDFError::PageNotFound { index };
        let mut path: SmallVec<[(u32, u32); 16]> = SmallVec::new();
        let mut inherited = Inherited::default();
        let mut node_ref = self.root.clone();
        let mut remaining = index;

        'descend: loop {
            if let PDFObject::Ref { num, generation } = node_ref {
                if path.contains(&(num, generation)) {
                    log::warn!("page tree cycle through object {num}");
                    return Err(not_found);
                }
                path.push((num, generation));
            }
            let node = match xref.fetch_if_ref(&node_ref)? {
                PDFObject::Dictionary(dict) => dict,
                _ => return Err(not_found),
            };
            inherited.absorb(&node);

            let kids = match node.get("Kids").cloned() {
                Some(kids) => xref.fetch_if_ref(&kids)?,
                None if remaining == 0 => {
                    return Page::resolve(xref, index, &inherited);
                }
                None => return Err(not_found),
            };
            let kids = kids.as_array().ok_or(not_found.clone())?;

            for kid in kids {
                let kid_dict = match xref.fetch_if_ref(kid)? {
                    PDFObject::Dictionary(dict) => dict,
                    _ => continue,
                };

                let is_leaf = kid_dict.get("Type").and_then(PDFObject::as_name) == Some("Page")
                    || !kid_dict.contains_key("Kids");
                if is_leaf {
                    if remaining == 0 {
                        if let PDFObject::Ref { num, generation } = kid {
                            if path.contains(&(*num, *generation)) {
                                return Err(not_found);
                            }
                        }
                        inherited.absorb(&kid_dict);
                        return Page::resolve(xref, index, &inherited);
                    }
                    remaining -= 1;
                    continue;
                }

                let subtree = kid_dict
                    .get("Count")
                    .and_then(PDFObject::as_int)
                    .filter(|n| *n >= 0)
                    .map(|n| n as usize);
                match subtree {
                    Some(count) if remaining >= count => remaining -= count,
                    _ => {
                        node_ref = kid.clone();
                        continue 'descend;
                    }
                }
            }

            return Err(not_found);
        }
    }
}

impl Page {
    fn resolve(xref: &mut XRef, index: usize, inherited: &Inherited) -> PDFResult<Page> {
        let media_box = match &inherited.media_box {
            Some(obj) => rectangle(xref, obj)?,
            None => None,
        };
        if media_box.is_none() {
            log::debug!("page {index} has no usable /MediaBox, using US Letter");
        }

        let rotate = match &inherited.rotate {
            Some(obj) => xref.fetch_if_ref(obj)?.as_int().unwrap_or(0),
            None => 0,
        };
        let rotate = if rotate % 90 == 0 { rotate.rem_euclid(360) } else { 0 };

        Ok(Page { media_box, rotate })
    }
}

/// Reads a four-number rectangle, resolving indirect elements.
fn rectangle(xref: &mut XRef, obj: &PDFObject) -> PDFResult<Option<[f64; 4]>> {
    let array = xref.fetch_if_ref(obj)?;
    let Some(items) = array.as_array() else {
        return Ok(None);
    };
    if items.len() != 4 {
        return Ok(None);
    }

    let mut rect = [0.0; 4];
    for (slot, item) in rect.iter_mut().zip(items) {
        match xref.fetch_if_ref(item)?.as_number() {
            Some(n) => *slot = n,
            None => return Ok(None),
        }
    }
    let degenerate = rect[0] == rect[2] || rect[1] == rect[3];
    Ok((!degenerate).then_some(rect))
}

/// Counts leaf pages below `root`.
fn count_leaves(root: &PDFObject, xref: &mut XRef) -> PDFResult<i32> {
    let mut stack: SmallVec<[PDFObject; 16]> = SmallVec::new();
    let mut seen = rustc_hash::FxHashSet::default();
    let mut visited = 0usize;
    let mut leaves = 0i32;
    stack.push(root.clone());

    while let Some(node_ref) = stack.pop() {
        visited += 1;
        if visited > MAX_TREE_NODES {
            return Err(PDFError::parse("Page tree is too large"));
        }
        if let PDFObject::Ref { num, generation } = node_ref {
            if !seen.insert((num, generation)) {
                continue;
            }
        }
        let node = xref.fetch_if_ref(&node_ref)?;
        match node.get("Kids") {
            Some(kids) => {
                if let PDFObject::Array(kids) = xref.fetch_if_ref(kids)? {
                    stack.extend(kids.into_iter().rev());
                }
            }
            None if node.as_dict().is_some() => leaves = leaves.saturating_add(1),
            None => {}
        }
    }
    Ok(leaves)
}
