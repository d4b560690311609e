//! Asset references embedded in rich-text bodies.
//!
//! Bodies are markdown that may contain raw HTML. An asset reference is any
//! image, link or media tag whose URL points below the public asset base URL
//! and parses as a [`StorageKey`].

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use regex::Regex;
use serde::Serialize;

use crate::storage::StorageKey;

/// Identity of an asset independent of the namespace it currently lives in.
///
/// A body written while the asset was staged (`u1/temp/a.png`) and the same
/// body after promotion (`u1/post/p1/a.png`) both yield `{u1, a.png}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NormalizedRef {
    pub owner_id: String,
    pub filename: String,
}

impl StorageKey {
    pub fn normalized(&self) -> NormalizedRef {
        NormalizedRef {
            owner_id: self.owner_id().to_string(),
            filename: self.filename().to_string(),
        }
    }
}

/// One occurrence of an asset URL in a body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetReference {
    /// Position of this reference among all references in the body.
    pub id: usize,
    /// Byte range of the URL inside the body.
    pub span: Range<usize>,
    pub url: String,
    pub key: StorageKey,
}

impl AssetReference {
    pub fn normalized(&self) -> NormalizedRef {
        self.key.normalized()
    }
}

/// Finds asset references in markdown/HTML bodies.
pub struct ReferenceExtractor {
    prefixes: Vec<String>,
    markdown_inline: Regex,
    markdown_definition: Regex,
    html_attribute: Regex,
}

impl ReferenceExtractor {
    /// `public_base_url` is the prefix under which assets are served, either
    /// a path (`/files`) or an absolute URL (`https://cdn.example.com/files`).
    /// For absolute URLs the bare path form is accepted as well.
    pub fn new(public_base_url: &str) -> Self {
        let base = public_base_url.trim_end_matches('/');
        let mut prefixes = vec![format!("{base}/")];
        if let Some(path) = absolute_url_path(base) {
            prefixes.push(format!("{}/", path.trim_end_matches('/')));
        }

        Self {
            prefixes,
            // Anchored on `](` so link text may itself hold an image.
            markdown_inline: Regex::new(
                r#"\]\(\s*<?([^\s()<>]+)>?(?:\s+(?:"[^"\n]*"|'[^'\n]*'))?\s*\)"#,
            )
            .expect("valid markdown inline regex"),
            markdown_definition: Regex::new(r"(?m)^ {0,3}\[[^\]\n]+\]:[ \t]*<?([^\s<>]+)>?")
                .expect("valid markdown definition regex"),
            html_attribute: Regex::new(
                r#"(?i)<(?:img|a|video|audio|source)\b[^>]*?\s(?:src|href)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+?)/?(?:[\s>]|$))"#,
            )
            .expect("valid html attribute regex"),
        }
    }

    /// All asset references in `body`, ordered by position.
    ///
    /// Never fails: URLs that do not resolve to a storage key are skipped.
    pub fn extract(&self, body: &str) -> Vec<AssetReference> {
        let mut spans: BTreeMap<usize, Range<usize>> = BTreeMap::new();

        let patterns = [
            &self.markdown_inline,
            &self.markdown_definition,
            &self.html_attribute,
        ];
        for pattern in patterns {
            for caps in pattern.captures_iter(body) {
                // Only one URL group participates per match.
                if let Some(url) = caps.iter().skip(1).flatten().next() {
                    spans.entry(url.start()).or_insert(url.range());
                }
            }
        }

        spans
            .into_values()
            .filter_map(|span| {
                let url = &body[span.clone()];
                self.resolve(url).map(|key| (span, url.to_string(), key))
            })
            .enumerate()
            .map(|(id, (span, url, key))| AssetReference { id, span, url, key })
            .collect()
    }

    /// Normalized identities of every asset referenced in `body`.
    pub fn references(&self, body: &str) -> BTreeSet<NormalizedRef> {
        self.extract(body)
            .iter()
            .map(AssetReference::normalized)
            .collect()
    }

    /// Map a URL to the storage key it addresses, if it points at an asset.
    pub fn resolve(&self, url: &str) -> Option<StorageKey> {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        self.prefixes
            .iter()
            .find_map(|prefix| path.strip_prefix(prefix.as_str()))
            .and_then(|rest| StorageKey::parse(rest).ok())
    }
}

/// Path component of an absolute `http(s)://host/path` URL.
fn absolute_url_path(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    rest.find('/').map(|idx| &rest[idx..])
}

/// Replace the URL of each reference for which `replacement` returns a value.
///
/// Edits are applied at the recorded spans, so text that merely looks like an
/// asset URL elsewhere in the body is never touched.
pub fn rewrite<F>(body: &str, references: &[AssetReference], mut replacement: F) -> String
where
    F: FnMut(&AssetReference) -> Option<String>,
{
    let mut ordered: Vec<&AssetReference> = references.iter().collect();
    ordered.sort_by_key(|r| r.span.start);

    let mut out = String::with_capacity(body.len());
    let mut cursor = 0;
    for reference in ordered {
        let span = &reference.span;
        if span.start < cursor || span.end > body.len() {
            continue;
        }
        if let Some(new_url) = replacement(reference) {
            out.push_str(&body[cursor..span.start]);
            out.push_str(&new_url);
            cursor = span.end;
        }
    }
    out.push_str(&body[cursor..]);
    out
}
