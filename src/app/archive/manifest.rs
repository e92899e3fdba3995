//! MECA manifest lookup

use std::path::{Component, Path, PathBuf};

use crate::app::jats::preprocess::preprocess;
use crate::app::jats::tree::{self, Element};
use crate::errors::MetadataResult;

/// Parse manifest XML into a tree
///
/// Manifests get the same text repairs as manuscripts, so HTML entities and
/// bare ampersands do not make the archive unreadable.
pub fn parse_manifest(xml: &str) -> MetadataResult<Element> {
    tree::parse(&preprocess(xml))
}

/// Archive-relative path of the manuscript XML listed by a manifest
///
/// Takes the first `item` typed `article` that has an `instance` whose media
/// type contains `xml` and whose href names neither the manifest nor the
/// directives file.
pub fn article_href(manifest: &Element) -> Option<String> {
    let items = manifest.find_all(|e| {
        e.local_name() == "item"
            && (e.attr("type") == Some("article") || e.attr("item-type") == Some("article"))
    });

    items.into_iter().find_map(|item| {
        item.find_all(|e| e.local_name() == "instance")
            .into_iter()
            .filter(|instance| {
                instance
                    .attr("media-type")
                    .is_some_and(|media| media.to_ascii_lowercase().contains("xml"))
            })
            .filter_map(href_of)
            .find(|href| {
                let lower = href.to_ascii_lowercase();
                !lower.contains("manifest") && !lower.contains("directives")
            })
    })
}

fn href_of(element: &Element) -> Option<String> {
    element
        .attributes
        .iter()
        .find(|(key, _)| key == "href" || key.ends_with(":href"))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Relative path that stays inside its base directory, or `None`
pub fn safe_relative_path(path: &str) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}

/// Zip entry names to try for `href`, relative to the manifest's directory first
pub fn entry_candidates(manifest_entry: &str, href: &str) -> Vec<String> {
    let href = href.trim_start_matches("./");
    let mut candidates = Vec::with_capacity(2);
    if let Some((dir, _)) = manifest_entry.rsplit_once('/') {
        candidates.push(format!("{dir}/{href}"));
    }
    candidates.push(href.to_string());
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest xmlns="http://manuscriptexchange.org" xmlns:xlink="http://www.w3.org/1999/xlink" manifest-version="1">
  <item type="manifest"><instance media-type="application/xml" xlink:href="manifest.xml"/></item>
  <item type="transfer-metadata"><instance media-type="application/xml" xlink:href="transfer.xml"/></item>
  <item type="article" id="a1">
    <instance media-type="application/pdf" xlink:href="content/123.pdf"/>
    <instance media-type="application/xml" xlink:href="directives.xml"/>
    <instance media-type="application/xml" xlink:href="content/123.xml"/>
  </item>
</manifest>"#;

    #[test]
    fn test_article_href_skips_other_instances() {
        let root = parse_manifest(MANIFEST).unwrap();
        assert_eq!(article_href(&root), Some("content/123.xml".to_string()));
    }

    #[test]
    fn test_no_article_item() {
        let root =
            parse_manifest(r#"<manifest><item type="figure"><instance media-type="text/xml" href="f.xml"/></item></manifest>"#)
                .unwrap();
        assert_eq!(article_href(&root), None);
    }

    #[test]
    fn test_manifest_with_bare_ampersand() {
        let xml = r#"<manifest>
  <item type="article"><title>R&D notes&nbsp;v2</title>
    <instance media-type="application/xml" href="content/a&b.xml"/>
  </item>
</manifest>"#;
        let root = parse_manifest(xml).unwrap();
        assert_eq!(article_href(&root), Some("content/a&b.xml".to_string()));
    }

    #[test]
    fn test_safe_relative_path() {
        assert_eq!(
            safe_relative_path("./content/a.xml"),
            Some(PathBuf::from("content/a.xml"))
        );
        assert_eq!(safe_relative_path("../etc/passwd"), None);
        assert_eq!(safe_relative_path("/abs.xml"), None);
        assert_eq!(safe_relative_path(""), None);
    }

    #[test]
    fn test_entry_candidates() {
        assert_eq!(
            entry_candidates("pkg/manifest.xml", "./content/a.xml"),
            vec!["pkg/content/a.xml".to_string(), "content/a.xml".to_string()]
        );
        assert_eq!(
            entry_candidates("manifest.xml", "content/a.xml"),
            vec!["content/a.xml".to_string()]
        );
    }
}
