//! Slug derivation and output file naming.
//!
//! Every discovered image gets a *slug*: a stable identifier derived from
//! its source path that names all of its generated files. Output names are
//! pure functions of slug and width, so re-runs compute the same names and
//! the whitelist lines up with what previous runs wrote.
//!
//! ## Slug rules
//!
//! The slug is the sanitized file stem: lowercased, with runs of anything
//! that is not `a-z0-9` collapsed to a single `-`:
//!
//! - `assets/images/My Photo.jpg` → `my-photo`
//! - `posts/2019/header.png` → `header`
//!
//! When two or more discovered images share a sanitized stem, *every*
//! member of the colliding group gets `-<hash>` appended, where the hash
//! is a prefix of the SHA-256 of the full relative path. Suffixing the
//! whole group (not just late-comers) keeps slugs independent of
//! discovery order, so adding or removing an unrelated file never renames
//! someone else's outputs.

use crate::discover::DiscoveredImage;
use crate::manifest::Format;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Mapping from relative source path to slug, rebuilt each run.
pub type PathToSlug = BTreeMap<String, String>;

/// Sanitize a relative source path into its base slug.
pub fn slugify(rel: &str) -> String {
    let stem = Path::new(rel)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let mut slug = String::with_capacity(stem.len());
    let mut pending_dash = false;
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("image");
    }
    slug
}

/// Assign a unique slug to every discovered image.
///
/// Slugs are unique across the run; see the module docs for the collision
/// rule.
pub fn assign_slugs(images: &[DiscoveredImage]) -> PathToSlug {
    let mut by_base: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for image in images {
        by_base.entry(slugify(&image.rel)).or_default().push(&image.rel);
    }

    let mut mapping = PathToSlug::new();
    let mut taken = BTreeSet::new();
    for (base, rels) in &by_base {
        if rels.len() == 1 {
            mapping.insert(rels[0].to_string(), base.clone());
            taken.insert(base.clone());
        }
    }
    for (base, rels) in &by_base {
        if rels.len() == 1 {
            continue;
        }
        for rel in rels {
            // Extend the hash prefix until unique; 8 hex chars virtually
            // always suffice.
            let digest = format!("{:x}", Sha256::digest(rel.as_bytes()));
            let mut len = 8;
            let slug = loop {
                let candidate = format!("{}-{}", base, &digest[..len]);
                if !taken.contains(&candidate) {
                    break candidate;
                }
                len = (len + 8).min(digest.len());
            };
            taken.insert(slug.clone());
            mapping.insert(rel.to_string(), slug);
        }
    }
    mapping
}

/// File name of a resized variant: `{slug}-{width}.{ext}`.
pub fn variant_file_name(slug: &str, width: u32, format: Format) -> String {
    format!("{}-{}.{}", slug, width, format.ext())
}

/// File name of a verbatim original copy: `{slug}.{ext}`.
pub fn original_file_name(slug: &str, format: Format) -> String {
    format!("{}.{}", slug, format.ext())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn img(rel: &str) -> DiscoveredImage {
        DiscoveredImage {
            path: PathBuf::from(rel),
            rel: rel.to_string(),
        }
    }

    // =========================================================================
    // slugify
    // =========================================================================

    #[test]
    fn slugify_lowercases_and_dashes() {
        assert_eq!(slugify("assets/My Photo.jpg"), "my-photo");
        assert_eq!(slugify("a/b/Header_Image.png"), "header-image");
        assert_eq!(slugify("dawn.jpeg"), "dawn");
    }

    #[test]
    fn slugify_collapses_runs_and_trims() {
        assert_eq!(slugify("x/--weird__  name--.jpg"), "weird-name");
    }

    #[test]
    fn slugify_empty_stem_falls_back() {
        assert_eq!(slugify("x/---.jpg"), "image");
    }

    // =========================================================================
    // assign_slugs
    // =========================================================================

    #[test]
    fn unique_stems_keep_plain_slugs() {
        let images = vec![img("a/dawn.jpg"), img("a/dusk.jpg")];
        let slugs = assign_slugs(&images);
        assert_eq!(slugs["a/dawn.jpg"], "dawn");
        assert_eq!(slugs["a/dusk.jpg"], "dusk");
    }

    #[test]
    fn colliding_stems_all_get_suffixes() {
        let images = vec![img("posts/one/header.jpg"), img("posts/two/header.jpg")];
        let slugs = assign_slugs(&images);

        let a = &slugs["posts/one/header.jpg"];
        let b = &slugs["posts/two/header.jpg"];
        assert_ne!(a, b);
        assert!(a.starts_with("header-"));
        assert!(b.starts_with("header-"));
    }

    #[test]
    fn collision_suffix_is_stable_under_unrelated_additions() {
        let two = vec![img("posts/one/header.jpg"), img("posts/two/header.jpg")];
        let three = vec![
            img("posts/one/header.jpg"),
            img("posts/two/header.jpg"),
            img("posts/zzz/other.jpg"),
        ];
        let slugs_two = assign_slugs(&two);
        let slugs_three = assign_slugs(&three);
        assert_eq!(
            slugs_two["posts/one/header.jpg"],
            slugs_three["posts/one/header.jpg"]
        );
        assert_eq!(
            slugs_two["posts/two/header.jpg"],
            slugs_three["posts/two/header.jpg"]
        );
    }

    #[test]
    fn all_slugs_unique() {
        let images = vec![
            img("a/header.jpg"),
            img("b/header.jpg"),
            img("c/header.jpg"),
            img("d/solo.png"),
        ];
        let slugs = assign_slugs(&images);
        let mut values: Vec<&String> = slugs.values().collect();
        values.sort();
        values.dedup();
        assert_eq!(values.len(), 4);
    }

    // =========================================================================
    // Output file names
    // =========================================================================

    #[test]
    fn variant_and_original_names() {
        assert_eq!(variant_file_name("dawn", 400, Format::Jpg), "dawn-400.jpg");
        assert_eq!(variant_file_name("dawn", 1600, Format::Png), "dawn-1600.png");
        assert_eq!(original_file_name("dawn", Format::Webp), "dawn.webp");
    }
}
