//! The PackURI value type: a part name within an OPC package.
use super::error::{OpcError, Result};

/// Pseudo-partname of the package itself
pub const PACKAGE_URI: &str = "/";

/// Partname of the content types part
pub const CONTENT_TYPES_URI: &str = "/[Content_Types].xml";

/// Represents a package URI, which is a partname within an OPC package.
///
/// PackURIs always begin with a forward slash and use forward slashes as path
/// separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackURI {
    uri: String,
}

impl PackURI {
    /// Create a new PackURI; the string must begin with a forward slash.
    pub fn new<S: Into<String>>(uri: S) -> Result<Self> {
        let uri = uri.into();
        if !uri.starts_with('/') {
            return Err(OpcError::InvalidPackUri(format!(
                "PackURI must begin with slash, got '{uri}'"
            )));
        }
        Ok(PackURI { uri })
    }

    /// The package pseudo-partname `/`.
    #[inline]
    pub fn package() -> Self {
        PackURI {
            uri: PACKAGE_URI.to_string(),
        }
    }

    /// PackURI of a ZIP member name.
    pub fn from_membername(name: &str) -> Self {
        PackURI {
            uri: format!("/{}", name.trim_start_matches('/')),
        }
    }

    /// Resolve a relative reference (like `../embeddings/a.bin`) against a
    /// base URI (like `/word`).
    ///
    /// A reference that starts with `/` is already absolute.
    pub fn from_rel_ref(base_uri: &str, relative_ref: &str) -> Result<Self> {
        let joined = if relative_ref.starts_with('/') {
            relative_ref.to_string()
        } else if base_uri.ends_with('/') {
            format!("{base_uri}{relative_ref}")
        } else {
            format!("{base_uri}/{relative_ref}")
        };
        Self::new(normalize_path(&joined))
    }

    /// Directory portion, `/ppt/slides` for `/ppt/slides/slide1.xml`.
    pub fn base_uri(&self) -> &str {
        match self.uri.rfind('/') {
            Some(0) | None => "/",
            Some(pos) => &self.uri[..pos],
        }
    }

    /// Filename portion, empty for the package pseudo-partname.
    pub fn filename(&self) -> &str {
        match self.uri.rfind('/') {
            Some(pos) => &self.uri[pos + 1..],
            None => "",
        }
    }

    /// Extension without the leading period.
    pub fn ext(&self) -> &str {
        let filename = self.filename();
        match filename.rfind('.') {
            Some(pos) => &filename[pos + 1..],
            None => "",
        }
    }

    /// The ZIP member name (leading slash stripped).
    #[inline]
    pub fn membername(&self) -> &str {
        &self.uri[1..]
    }

    /// PackURI of the `.rels` part holding this part's relationships.
    pub fn rels_uri(&self) -> PackURI {
        let rels_filename = format!("{}.rels", self.filename());
        let uri = match self.base_uri() {
            "/" => format!("/_rels/{rels_filename}"),
            base => format!("{base}/_rels/{rels_filename}"),
        };
        PackURI { uri }
    }

    /// Source part of a `.rels` part, the inverse of [`rels_uri`](Self::rels_uri).
    ///
    /// `None` when this is not a relationships part.
    pub fn rels_source(&self) -> Option<PackURI> {
        let filename = self.filename();
        let source_name = filename.strip_suffix(".rels")?;
        let dir = self.base_uri();
        let parent = dir.strip_suffix("_rels")?;
        if !parent.ends_with('/') {
            return None;
        }
        Some(PackURI {
            uri: format!("{parent}{source_name}"),
        })
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.uri
    }
}

impl std::fmt::Display for PackURI {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Resolve `.` and `..` segments; `..` never climbs above the root.
fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {},
            ".." => {
                parts.pop();
            },
            _ => parts.push(part),
        }
    }
    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_slash() {
        assert!(PackURI::new("/word/document.xml").is_ok());
        assert!(matches!(
            PackURI::new("word/document.xml"),
            Err(OpcError::InvalidPackUri(_))
        ));
    }

    #[test]
    fn test_components() {
        let uri = PackURI::new("/ppt/embeddings/oleObject1.bin").unwrap();
        assert_eq!(uri.base_uri(), "/ppt/embeddings");
        assert_eq!(uri.filename(), "oleObject1.bin");
        assert_eq!(uri.ext(), "bin");
        assert_eq!(uri.membername(), "ppt/embeddings/oleObject1.bin");

        let package = PackURI::package();
        assert_eq!(package.base_uri(), "/");
        assert_eq!(package.filename(), "");
        assert_eq!(package.membername(), "");
    }

    #[test]
    fn test_from_rel_ref() {
        let uri = PackURI::from_rel_ref("/word", "../embeddings/x.docx").unwrap();
        assert_eq!(uri.as_str(), "/embeddings/x.docx");

        let uri = PackURI::from_rel_ref("/", "word/document.xml").unwrap();
        assert_eq!(uri.as_str(), "/word/document.xml");

        let uri = PackURI::from_rel_ref("/word", "/xl/a.bin").unwrap();
        assert_eq!(uri.as_str(), "/xl/a.bin");

        let uri = PackURI::from_rel_ref("/word", "../../../escape.bin").unwrap();
        assert_eq!(uri.as_str(), "/escape.bin");
    }

    #[test]
    fn test_rels_uri_and_back() {
        let doc = PackURI::new("/word/document.xml").unwrap();
        let rels = doc.rels_uri();
        assert_eq!(rels.as_str(), "/word/_rels/document.xml.rels");
        assert_eq!(rels.rels_source(), Some(doc));

        let package_rels = PackURI::package().rels_uri();
        assert_eq!(package_rels.as_str(), "/_rels/.rels");
        assert_eq!(package_rels.rels_source(), Some(PackURI::package()));

        assert_eq!(PackURI::new("/word/document.xml").unwrap().rels_source(), None);
    }
}
