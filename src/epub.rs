//! EPUB 3 writer with an NCX table of contents for older readers.

use crate::error::AssemblyError;
use chrono::Utc;
use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Cover image embedded in the book.
#[derive(Debug, Clone)]
pub struct CoverImage {
    pub data: Vec<u8>,
    pub media_type: String,
}

impl CoverImage {
    fn extension(&self) -> &'static str {
        match self.media_type.as_str() {
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/svg+xml" => "svg",
            _ => "jpg",
        }
    }
}

#[derive(Debug, Clone)]
struct Section {
    title: String,
    content: String,
}

/// An ebook under construction.
#[derive(Debug, Clone)]
pub struct Epub {
    title: String,
    author: String,
    description: String,
    lang: String,
    identifier: uuid::Uuid,
    cover: Option<(CoverImage, String)>,
    sections: Vec<Section>,
}

impl Epub {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: String::new(),
            description: String::new(),
            lang: "en".to_string(),
            identifier: uuid::Uuid::new_v4(),
            cover: None,
            sections: Vec::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn has_cover(&self) -> bool {
        self.cover.is_some()
    }

    pub fn set_author(&mut self, author: impl Into<String>) {
        self.author = author.into();
    }

    /// Sets the description. Any markup is escaped into the package metadata.
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Embeds a cover image styled by `stylesheet`.
    pub fn set_cover(&mut self, image: CoverImage, stylesheet: impl Into<String>) {
        self.cover = Some((image, stylesheet.into()));
    }

    /// Appends a section. `content` is an HTML fragment.
    pub fn add_section(&mut self, content: &str, title: impl Into<String>) {
        self.sections.push(Section {
            title: title.into(),
            content: normalize_xhtml(content),
        });
    }

    /// Section titles in reading order.
    pub fn section_titles(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.title.as_str())
    }

    /// Writes the book to `path`, replacing any existing file.
    pub fn write(&self, path: &Path) -> Result<(), AssemblyError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        self.write_to(file)?;
        Ok(())
    }

    /// Writes the archive to `writer` and returns it.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<W, AssemblyError> {
        let mut zip = ZipWriter::new(writer);

        // `mimetype` must be the first entry and stored uncompressed.
        let stored = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .unix_permissions(0o644);
        zip.start_file("mimetype", stored)?;
        zip.write_all(b"application/epub+zip")?;

        let deflated = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644);

        let modified = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let mut entries: Vec<(String, Vec<u8>)> = vec![
            (
                "META-INF/container.xml".to_string(),
                render_container_xml().into_bytes(),
            ),
            (
                "OEBPS/content.opf".to_string(),
                self.render_content_opf(&modified).into_bytes(),
            ),
            ("OEBPS/nav.xhtml".to_string(), self.render_nav_xhtml().into_bytes()),
            ("OEBPS/toc.ncx".to_string(), self.render_toc_ncx().into_bytes()),
            ("OEBPS/style.css".to_string(), STYLE_CSS.as_bytes().to_vec()),
        ];

        if let Some((image, stylesheet)) = &self.cover {
            entries.push(("OEBPS/cover.css".to_string(), stylesheet.as_bytes().to_vec()));
            entries.push((
                format!("OEBPS/cover.{}", image.extension()),
                image.data.clone(),
            ));
            entries.push((
                "OEBPS/cover.xhtml".to_string(),
                self.render_cover_xhtml(image).into_bytes(),
            ));
        }

        for (index, section) in self.sections.iter().enumerate() {
            entries.push((
                format!("OEBPS/{}", section_file(index)),
                wrap_xhtml_document(&section.title, &self.lang, &section.content).into_bytes(),
            ));
        }

        for (name, data) in entries {
            zip.start_file(name, deflated)?;
            zip.write_all(&data)?;
        }

        Ok(zip.finish()?)
    }

    fn render_content_opf(&self, modified: &str) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        out.push_str(&format!(
            "<package xmlns=\"http://www.idpf.org/2007/opf\" unique-identifier=\"bookid\" version=\"3.0\" xml:lang=\"{}\">\n",
            xml_escape(&self.lang)
        ));
        out.push_str("  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n");
        out.push_str(&format!(
            "    <dc:identifier id=\"bookid\">urn:uuid:{}</dc:identifier>\n",
            self.identifier
        ));
        out.push_str(&format!(
            "    <dc:title>{}</dc:title>\n",
            xml_escape(&self.title)
        ));
        if !self.author.is_empty() {
            out.push_str(&format!(
                "    <dc:creator>{}</dc:creator>\n",
                xml_escape(&self.author)
            ));
        }
        if !self.description.is_empty() {
            out.push_str(&format!(
                "    <dc:description>{}</dc:description>\n",
                xml_escape(&self.description)
            ));
        }
        out.push_str(&format!(
            "    <dc:language>{}</dc:language>\n",
            xml_escape(&self.lang)
        ));
        out.push_str(&format!(
            "    <meta property=\"dcterms:modified\">{}</meta>\n",
            xml_escape(modified)
        ));
        if self.cover.is_some() {
            out.push_str("    <meta name=\"cover\" content=\"cover-image\" />\n");
        }
        out.push_str("  </metadata>\n");

        out.push_str("  <manifest>\n");
        out.push_str(
            "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\" />\n",
        );
        out.push_str(
            "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\" />\n",
        );
        out.push_str("    <item id=\"css\" href=\"style.css\" media-type=\"text/css\" />\n");
        if let Some((image, _)) = &self.cover {
            out.push_str(
                "    <item id=\"cover-css\" href=\"cover.css\" media-type=\"text/css\" />\n",
            );
            out.push_str(&format!(
                "    <item id=\"cover-image\" href=\"cover.{}\" media-type=\"{}\" properties=\"cover-image\" />\n",
                image.extension(),
                xml_escape(&image.media_type)
            ));
            out.push_str(
                "    <item id=\"cover\" href=\"cover.xhtml\" media-type=\"application/xhtml+xml\" />\n",
            );
        }
        for index in 0..self.sections.len() {
            out.push_str(&format!(
                "    <item id=\"{}\" href=\"{}\" media-type=\"application/xhtml+xml\" />\n",
                section_id(index),
                section_file(index)
            ));
        }
        out.push_str("  </manifest>\n");

        out.push_str("  <spine toc=\"ncx\">\n");
        if self.cover.is_some() {
            out.push_str("    <itemref idref=\"cover\" linear=\"no\" />\n");
        }
        for index in 0..self.sections.len() {
            out.push_str(&format!("    <itemref idref=\"{}\" />\n", section_id(index)));
        }
        out.push_str("  </spine>\n");
        out.push_str("</package>\n");
        out
    }

    fn render_nav_xhtml(&self) -> String {
        let mut body = String::new();
        body.push_str(&format!("  <h1>{}</h1>\n", xml_escape(&self.title)));
        body.push_str("  <nav epub:type=\"toc\" id=\"toc\">\n");
        body.push_str("    <ol>\n");
        for (index, section) in self.sections.iter().enumerate() {
            body.push_str(&format!(
                "      <li><a href=\"{}\">{}</a></li>\n",
                section_file(index),
                xml_escape(&section.title)
            ));
        }
        body.push_str("    </ol>\n");
        body.push_str("  </nav>\n");

        wrap_xhtml_document(&self.title, &self.lang, &body).replacen(
            "<html xmlns=\"http://www.w3.org/1999/xhtml\"",
            "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\"",
            1,
        )
    }

    fn render_toc_ncx(&self) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        out.push_str(
            "<!DOCTYPE ncx PUBLIC \"-//NISO//DTD ncx 2005-1//EN\" \"http://www.daisy.org/z3986/2005/ncx-2005-1.dtd\">\n",
        );
        out.push_str("<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n");
        out.push_str("  <head>\n");
        out.push_str(&format!(
            "    <meta name=\"dtb:uid\" content=\"urn:uuid:{}\" />\n",
            self.identifier
        ));
        out.push_str("    <meta name=\"dtb:depth\" content=\"1\" />\n");
        out.push_str("    <meta name=\"dtb:totalPageCount\" content=\"0\" />\n");
        out.push_str("    <meta name=\"dtb:maxPageNumber\" content=\"0\" />\n");
        out.push_str("  </head>\n");
        out.push_str(&format!(
            "  <docTitle><text>{}</text></docTitle>\n",
            xml_escape(&self.title)
        ));
        out.push_str("  <navMap>\n");
        for (index, section) in self.sections.iter().enumerate() {
            let play = index + 1;
            out.push_str(&format!(
                "    <navPoint id=\"navPoint-{play}\" playOrder=\"{play}\">\n"
            ));
            out.push_str(&format!(
                "      <navLabel><text>{}</text></navLabel>\n",
                xml_escape(&section.title)
            ));
            out.push_str(&format!(
                "      <content src=\"{}\" />\n",
                section_file(index)
            ));
            out.push_str("    </navPoint>\n");
        }
        out.push_str("  </navMap>\n");
        out.push_str("</ncx>\n");
        out
    }

    fn render_cover_xhtml(&self, image: &CoverImage) -> String {
        let body = format!(
            "  <div class=\"cover\"><img src=\"cover.{}\" alt=\"{}\" /></div>\n",
            image.extension(),
            xml_escape(&self.title)
        );
        wrap_xhtml_document(&self.title, &self.lang, &body).replacen(
            "href=\"style.css\" />",
            "href=\"cover.css\" />",
            1,
        )
    }
}

const STYLE_CSS: &str = r#"@charset "utf-8";

html { font-family: serif; }
body { margin: 0; padding: 0 1.2em; line-height: 1.6; }
img { max-width: 100%; height: auto; }
pre, code { font-family: ui-monospace, Menlo, Consolas, monospace; }
pre { white-space: pre-wrap; }
"#;

fn section_id(index: usize) -> String {
    format!("section-{:04}", index + 1)
}

fn section_file(index: usize) -> String {
    format!("{}.xhtml", section_id(index))
}

fn render_container_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#
    .to_string()
}

fn wrap_xhtml_document(title: &str, lang: &str, body_html: &str) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" lang=\"{}\" xml:lang=\"{}\">\n",
        xml_escape(lang),
        xml_escape(lang)
    ));
    out.push_str("<head>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(title)));
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str("  <link rel=\"stylesheet\" type=\"text/css\" href=\"style.css\" />\n");
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(body_html);
    if !body_html.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

/// Makes serialized HTML acceptable to XHTML readers.
fn normalize_xhtml(html: &str) -> String {
    ensure_xhtml_void_tags(&html.replace("&nbsp;", "&#160;"))
}

fn ensure_xhtml_void_tags(html: &str) -> String {
    const VOID_TAGS: &[&str] = &[
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
        "source", "track", "wbr",
    ];

    let bytes = html.as_bytes();
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;

    while let Some(rel_lt) = html[cursor..].find('<') {
        let lt = cursor + rel_lt;
        out.push_str(&html[cursor..lt]);

        // Find the closing `>` outside quotes.
        let mut in_quote: Option<u8> = None;
        let mut gt = lt + 1;
        while gt < bytes.len() {
            let b = bytes[gt];
            match in_quote {
                Some(q) if b == q => in_quote = None,
                Some(_) => {}
                None if b == b'"' || b == b'\'' => in_quote = Some(b),
                None if b == b'>' => break,
                None => {}
            }
            gt += 1;
        }
        if gt >= bytes.len() {
            out.push_str(&html[lt..]);
            return out;
        }

        let raw_tag = &html[lt..=gt];
        let name_start = lt + 1;
        let mut name_end = name_start;
        while name_end < gt && bytes[name_end].is_ascii_alphanumeric() {
            name_end += 1;
        }

        let tag_name = html[name_start..name_end].to_ascii_lowercase();
        let tag_without_gt = &html[lt..gt];
        if VOID_TAGS.contains(&tag_name.as_str()) && !tag_without_gt.trim_end().ends_with('/') {
            out.push_str(tag_without_gt);
            out.push_str(" />");
        } else {
            out.push_str(raw_tag);
        }

        cursor = gt + 1;
    }

    out.push_str(&html[cursor..]);
    out
}

/// Escapes text for use in XML content and attribute values.
pub(crate) fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
