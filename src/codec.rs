//! PDF page-container codec built on `lopdf`
//!
//! Each remote page is a complete single-page PDF. [`decode_first_page`] parses one
//! and keeps its first page as an opaque [`Page`]; [`DocumentBuilder`] re-parents
//! pages under a fresh page tree, in append order, and serializes the result.

use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// PDF version written into merged documents
const OUTPUT_PDF_VERSION: &str = "1.6";

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE_ATTRIBUTES: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Page trees deeper than this are treated as malformed
const MAX_PAGE_TREE_DEPTH: usize = 64;

/// Errors raised by the page-container codec
#[derive(Debug, Error)]
pub enum CodecError {
    /// The bytes are not a readable PDF
    #[error("failed to parse page container: {0}")]
    Parse(String),

    /// The container parsed but holds no page
    #[error("page container has no pages")]
    NoPage,

    /// The merged document could not be serialized
    #[error("failed to serialize document: {0}")]
    Serialize(String),
}

/// One decoded page and every object reachable from it
///
/// The page-tree nodes of the source container are not included; the page is
/// re-parented when appended to a [`DocumentBuilder`].
pub struct Page {
    objects: BTreeMap<ObjectId, Object>,
    page_id: ObjectId,
}

impl Page {
    /// The page dictionary
    pub fn dictionary(&self) -> Option<&Dictionary> {
        self.objects.get(&self.page_id).and_then(|o| o.as_dict().ok())
    }

    /// Number of indirect objects carried with the page
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("page_id", &self.page_id)
            .field("objects", &self.objects.len())
            .finish()
    }
}

/// Parse a page container and extract its first page
pub fn decode_first_page(bytes: &[u8]) -> Result<Page, CodecError> {
    let mut document = Document::load_mem(bytes).map_err(|e| CodecError::Parse(e.to_string()))?;
    let page_id = document
        .get_pages()
        .values()
        .next()
        .copied()
        .ok_or(CodecError::NoPage)?;
    inherit_attributes(&mut document, page_id);
    let objects = reachable_objects(document.objects, page_id);
    Ok(Page { objects, page_id })
}

/// Copy inheritable attributes from ancestor page-tree nodes onto the page itself,
/// so the page keeps its geometry and resources once its original parent is dropped.
fn inherit_attributes(document: &mut Document, page_id: ObjectId) {
    let mut inherited: Vec<(&[u8], Object)> = Vec::new();

    let Ok(page) = document.get_dictionary(page_id) else {
        return;
    };
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(node_id) = parent {
        if depth >= MAX_PAGE_TREE_DEPTH {
            tracing::warn!(?page_id, "Page tree too deep, stopping attribute inheritance");
            break;
        }
        let Ok(node) = document.get_dictionary(node_id) else {
            break;
        };
        for key in INHERITABLE_ATTRIBUTES {
            if page.has(key) || inherited.iter().any(|(k, _)| *k == key) {
                continue;
            }
            if let Ok(value) = node.get(key) {
                inherited.push((key, value.clone()));
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }

    if inherited.is_empty() {
        return;
    }
    if let Ok(page) = document.get_dictionary_mut(page_id) {
        for (key, value) in inherited {
            page.set(key, value);
        }
    }
}

/// Walk references from `root` and keep every object it can reach,
/// except page-tree nodes and the catalog.
fn reachable_objects(
    mut objects: BTreeMap<ObjectId, Object>,
    root: ObjectId,
) -> BTreeMap<ObjectId, Object> {
    let mut kept = BTreeMap::new();
    let mut pending = vec![root];

    while let Some(id) = pending.pop() {
        let Some(object) = objects.remove(&id) else {
            continue;
        };
        if id != root && is_page_tree_node(&object) {
            continue;
        }
        collect_references(&object, &mut pending);
        kept.insert(id, object);
    }
    kept
}

fn collect_references(object: &Object, out: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => out.push(*id),
        Object::Array(items) => items.iter().for_each(|item| collect_references(item, out)),
        Object::Dictionary(dict) => collect_dictionary_references(dict, out),
        Object::Stream(stream) => collect_dictionary_references(&stream.dict, out),
        _ => {}
    }
}

fn collect_dictionary_references(dict: &Dictionary, out: &mut Vec<ObjectId>) {
    for (key, value) in dict.iter() {
        // Parent links lead back into the source page tree.
        if key == b"Parent" {
            continue;
        }
        collect_references(value, out);
    }
}

fn is_page_tree_node(object: &Object) -> bool {
    match object {
        Object::Dictionary(dict) => dict
            .get(b"Type")
            .and_then(Object::as_name)
            .map(|name| matches!(name, b"Catalog" | b"Pages"))
            .unwrap_or(false),
        _ => false,
    }
}

/// Rewrite references through `mapping`; references to objects that were not
/// carried along become `null`.
fn remap_references(object: &mut Object, mapping: &HashMap<ObjectId, ObjectId>) {
    match object {
        Object::Reference(id) => match mapping.get(id) {
            Some(new_id) => *id = *new_id,
            None => *object = Object::Null,
        },
        Object::Array(items) => items
            .iter_mut()
            .for_each(|item| remap_references(item, mapping)),
        Object::Dictionary(dict) => remap_dictionary(dict, mapping),
        Object::Stream(stream) => remap_dictionary(&mut stream.dict, mapping),
        _ => {}
    }
}

fn remap_dictionary(dict: &mut Dictionary, mapping: &HashMap<ObjectId, ObjectId>) {
    for (_, value) in dict.iter_mut() {
        remap_references(value, mapping);
    }
}

/// Builder for the merged output document
///
/// Owned by a single task; pages appear in the output in the order they are appended.
pub struct DocumentBuilder {
    document: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        let mut document = Document::with_version(OUTPUT_PDF_VERSION);
        let pages_id = document.new_object_id();
        Self {
            document,
            pages_id,
            page_ids: Vec::new(),
        }
    }

    /// Number of pages appended so far
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Append a page after all previously appended pages
    pub fn append(&mut self, page: Page) -> Result<(), CodecError> {
        let Page { objects, page_id } = page;

        let mut next_id = self.document.max_id;
        let mapping: HashMap<ObjectId, ObjectId> = objects
            .keys()
            .map(|old_id| {
                next_id += 1;
                (*old_id, (next_id, 0))
            })
            .collect();
        let new_page_id = *mapping.get(&page_id).ok_or(CodecError::NoPage)?;

        for (old_id, mut object) in objects {
            if let Some(new_id) = mapping.get(&old_id) {
                remap_references(&mut object, &mapping);
                self.document.objects.insert(*new_id, object);
            }
        }
        self.document.max_id = next_id;

        if let Ok(dict) = self.document.get_dictionary_mut(new_page_id) {
            dict.set("Parent", self.pages_id);
        }
        self.page_ids.push(new_page_id);
        Ok(())
    }

    /// Close the page tree and return the finished document
    pub fn finish(mut self) -> Document {
        let kids: Vec<Object> = self.page_ids.iter().map(|id| Object::Reference(*id)).collect();
        let count = self.page_ids.len() as i64;
        self.document.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.document.trailer.set("Root", catalog_id);
        self.document
    }

    /// Serialize the finished document into memory
    pub fn to_bytes(self) -> Result<Vec<u8>, CodecError> {
        let mut document = self.finish();
        let mut buffer = Vec::new();
        document
            .save_to(&mut buffer)
            .map_err(|e| CodecError::Serialize(e.to_string()))?;
        Ok(buffer)
    }
}
