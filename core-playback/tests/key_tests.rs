//! Tests for stable cache keys across signed URL variants

use core_playback::stable_key;

const BASES: &[&str] = &[
    "https://host/a.mp4",
    "https://host/b.mp4",
    "https://cdn.example.com/v/2024/clip.m3u8",
    "http://10.0.0.2:8080/media/a.mp4",
];

const SUFFIXES: &[&str] = &[
    "",
    "?sig=abc123",
    "?sig=def456&exp=1700000000",
    "#t=10",
    "?sig=abc#t=3",
    "#frag?looks=like-a-query",
    "?",
    "#",
];

#[test]
fn test_query_and_fragment_variants_share_key() {
    for base in BASES {
        for a in SUFFIXES {
            for b in SUFFIXES {
                let left = stable_key(&format!("{}{}", base, a));
                let right = stable_key(&format!("{}{}", base, b));
                assert_eq!(left, right, "{}{} vs {}{}", base, a, base, b);
                assert_eq!(left, *base);
            }
        }
    }
}

#[test]
fn test_different_paths_differ() {
    for (i, a) in BASES.iter().enumerate() {
        for b in &BASES[i + 1..] {
            assert_ne!(
                stable_key(&format!("{}?sig=same", a)),
                stable_key(&format!("{}?sig=same", b))
            );
        }
    }
}
