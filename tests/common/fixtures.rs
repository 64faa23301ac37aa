//! Page container fixtures and mock content service helpers

use lopdf::{Document, Object, Stream, dictionary};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// One-page PDF tagged with `/Marker marker`, `MediaBox` inherited from the page tree
pub fn single_page_pdf(marker: i64) -> Vec<u8> {
    let mut doc = Document::with_version("1.6");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        format!("BT /F1 12 Tf 72 720 Td (page {marker}) Tj ET").into_bytes(),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Marker" => marker,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1_i64,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(595),
                Object::Integer(842),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("fixture PDF serializes");
    bytes
}

/// The same container as served by the content service: `%ADF-1.6` magic
pub fn served_page(marker: i64) -> Vec<u8> {
    let mut bytes = single_page_pdf(marker);
    assert!(bytes.starts_with(b"%PDF-1.6"));
    bytes[..8].copy_from_slice(b"%ADF-1.6");
    bytes
}

/// Manifest script listing `names` the way the content service embeds them
pub fn manifest_for(names: &[String]) -> String {
    let entries: Vec<String> = names
        .iter()
        .enumerate()
        .map(|(i, name)| format!(r#"{{"n":{i},"src":"media/{name}","thumb":"thumb-{i}.jpg"}}"#))
        .collect();
    format!("var book = {{\"pages\":[{}]}};\n", entries.join(","))
}

/// Page file names `page-0.pdf` to `page-{count-1}.pdf`
pub fn page_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("page-{i}.pdf")).collect()
}

/// Mount the manifest for `book_id` listing `names`
pub async fn mount_manifest(server: &MockServer, book_id: &str, names: &[String]) {
    Mock::given(method("GET"))
        .and(path(format!("/cdn_proxy/{book_id}/data.js")))
        .respond_with(ResponseTemplate::new(200).set_body_string(manifest_for(names)))
        .mount(server)
        .await;
}

/// Mount a served page whose marker equals its number in `page-{number}.pdf`
pub async fn mount_page(server: &MockServer, book_id: &str, number: i64) {
    Mock::given(method("GET"))
        .and(path(format!("/cdn_proxy/{book_id}/media/page-{number}.pdf")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(served_page(number)))
        .mount(server)
        .await;
}

/// Page markers of a serialized document, in page order
pub fn markers(bytes: &[u8]) -> Vec<i64> {
    let doc = Document::load_mem(bytes).expect("output is a readable PDF");
    doc.get_pages()
        .values()
        .map(|id| {
            doc.get_dictionary(*id)
                .and_then(|page| page.get(b"Marker"))
                .and_then(Object::as_i64)
                .expect("every output page carries its marker")
        })
        .collect()
}
