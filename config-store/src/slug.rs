//! Deterministic, filesystem-safe stream slugs.
//!
//! The slug is persisted with the camera so a rename never silently
//! re-slugs other cameras; NVRs cache the stream URL.

/// Derive a slug from a camera name: lowercase, spaces and dashes
/// become underscores, everything else non-alphanumeric is dropped.
pub fn slugify(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if slug.is_empty() {
        "camera".to_string()
    } else {
        slug
    }
}

/// Derive a slug that does not collide with any in `taken`.
///
/// Collisions are resolved with a numeric suffix: `front_door`,
/// `front_door_2`, `front_door_3`, …
pub fn unique_slug<'a, I>(name: &str, taken: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: std::collections::HashSet<&str> = taken.into_iter().collect();
    let base = slugify(name);
    if !taken.contains(base.as_str()) {
        return base;
    }
    for n in 2.. {
        let candidate = format!("{}_{}", base, n);
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
    }
    unreachable!()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Front Door"), "front_door");
        assert_eq!(slugify("Cam-2 (PTZ)"), "cam_2_ptz");
        assert_eq!(slugify("Überwachung"), "berwachung");
    }

    #[test]
    fn test_slugify_empty_falls_back() {
        assert_eq!(slugify("!!!"), "camera");
    }

    #[test]
    fn test_unique_slug_no_collision() {
        assert_eq!(unique_slug("Front Door", ["garage"]), "front_door");
    }

    #[test]
    fn test_unique_slug_suffixes() {
        assert_eq!(
            unique_slug("Front Door", ["front_door"]),
            "front_door_2"
        );
        assert_eq!(
            unique_slug("Front Door", ["front_door", "front_door_2"]),
            "front_door_3"
        );
    }

    #[test]
    fn test_unique_slug_is_deterministic() {
        let a = unique_slug("Back Yard", ["back_yard"]);
        let b = unique_slug("Back Yard", ["back_yard"]);
        assert_eq!(a, b);
    }
}
