//! End-to-end search behavior over the public API

use bytegrep::{compile_patterns, Error, Pattern, Vm};

const CORPUS: &[u8] = b"aaabaacabbabcacbaccbbbcbccca";

fn run(patterns: Vec<Pattern>, input: &[u8]) -> Vec<(u64, u64, u64)> {
    let prog = compile_patterns(patterns).unwrap();
    let mut vm = Vm::new(&prog);
    let mut out = Vec::new();
    vm.search(input, 0, &mut |h| out.push((h.start, h.end, h.user_index)));
    vm.close_out(&mut |h| out.push((h.start, h.end, h.user_index)));
    out
}

fn hits(pattern: &str, input: &[u8]) -> Vec<(u64, u64, u64)> {
    run(vec![Pattern::new(pattern, 0)], input)
}

#[test]
fn alternation_with_trailing_nongreedy_plus() {
    assert_eq!(
        hits("aa|b+?", CORPUS),
        vec![
            (0, 2, 0),
            (3, 4, 0),
            (4, 6, 0),
            (8, 9, 0),
            (9, 10, 0),
            (11, 12, 0),
            (15, 16, 0),
            (19, 20, 0),
            (20, 21, 0),
            (21, 22, 0),
            (23, 24, 0)
        ]
    );
}

#[test]
fn counted_repetition() {
    assert_eq!(hits("a{2}b", CORPUS), vec![(1, 4, 0)]);
}

#[test]
fn greedy_plus_matches_longest_run() {
    // the greedy a+ must take the whole run of a before bc, and hits
    // never overlap
    assert_eq!(hits("a+bc", CORPUS), vec![(10, 13, 0)]);
}

#[test]
fn plain_literal_multiline() {
    let input: &[u8] = b"this is foo\nthis is bar\nthis is baz\nthis is foobar\nthis is foobaz\nthis is foobarbaz";
    assert_eq!(
        hits("foo", input),
        vec![(8, 11, 0), (44, 47, 0), (59, 62, 0), (74, 77, 0)]
    );
}

#[test]
fn two_patterns_shared_span_both_report() {
    let input: &[u8] = b"this is a cat in a hat\nfoobar\nhere is another cat";
    assert_eq!(
        run(
            vec![Pattern::new("[c][a][t]", 0), Pattern::new("[bch]at", 2)],
            input
        ),
        vec![
            (10, 13, 0),
            (10, 13, 2),
            (19, 22, 2),
            (46, 49, 0),
            (46, 49, 2)
        ]
    );
}

#[test]
fn zero_length_patterns_rejected() {
    for pattern in ["a?", "aa|b?", "aa|b*?", "aa|b??", "aa|b{0,1}", "ab|b*", ""] {
        let err = compile_patterns(vec![Pattern::new(pattern, 0)]).unwrap_err();
        assert!(
            matches!(err.errors[0], Error::EmptyPattern { .. }),
            "{:?} not rejected as empty",
            pattern
        );
    }
}

#[test]
fn counted_variants_from_reference_corpus() {
    assert_eq!(
        hits("aa|b{2}", CORPUS),
        vec![(0, 2, 0), (4, 6, 0), (8, 10, 0), (19, 21, 0)]
    );
    assert_eq!(
        hits("aa|b{1,2}", CORPUS),
        vec![
            (0, 2, 0),
            (3, 4, 0),
            (4, 6, 0),
            (8, 10, 0),
            (11, 12, 0),
            (15, 16, 0),
            (19, 21, 0),
            (21, 22, 0),
            (23, 24, 0)
        ]
    );
    assert_eq!(
        hits("aa|b{2,}", CORPUS),
        vec![(0, 2, 0), (4, 6, 0), (8, 10, 0), (19, 22, 0)]
    );
    assert_eq!(hits("aa|b{2}?", CORPUS), hits("aa|b{2}", CORPUS));
    assert_eq!(hits("aa|b{1,2}?", CORPUS), hits("aa|b+?", CORPUS));
    assert_eq!(hits("aa|b{2,}?", CORPUS), hits("aa|b{2}", CORPUS));
}

#[test]
fn greedy_alternation_from_reference_corpus() {
    assert_eq!(
        hits("ab|b+", CORPUS),
        vec![
            (2, 4, 0),
            (7, 9, 0),
            (9, 10, 0),
            (10, 12, 0),
            (15, 16, 0),
            (19, 22, 0),
            (23, 24, 0)
        ]
    );
    assert_eq!(hits("ab|b+?", CORPUS)[..4], [
        (2, 4, 0),
        (7, 9, 0),
        (9, 10, 0),
        (10, 12, 0)
    ]);
}

#[test]
fn case_insensitive_latin1() {
    let prog = compile_patterns(vec![
        Pattern::new("caf\\xE9", 0).case_insensitive(true)
    ])
    .unwrap();
    let mut vm = Vm::new(&prog);
    let mut out = Vec::new();
    // 0xC9 is the uppercase of 0xE9 in Latin-1
    vm.search(b"CAF\xC9 caf\xE9", 0, &mut |h| out.push((h.start, h.end)));
    vm.close_out(&mut |h| out.push((h.start, h.end)));
    assert_eq!(out, vec![(0, 4), (5, 9)]);
}

#[test]
fn utf8_pattern_matches_encoded_text() {
    let input = "prix: 10€ ou 20€".as_bytes();
    let euro = "€".as_bytes();
    let first = input.windows(3).position(|w| w == euro).unwrap() as u64;
    let hits = run(
        vec![Pattern::new("\\x{20AC}", 0).with_encodings(["UTF-8"])],
        input,
    );
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0], (first, first + 3, 0));
}

#[test]
fn multi_encoding_single_pattern() {
    // the same pattern finds both the ASCII and the UTF-16LE spelling
    let hits = run(
        vec![Pattern::new("id", 7).with_encodings(["ASCII", "UTF-16LE"])],
        b"id..i\x00d\x00..",
    );
    assert_eq!(hits, vec![(0, 2, 7), (4, 8, 7)]);
}

#[test]
fn dot_is_byte_wise_under_ascii() {
    assert_eq!(
        hits("a.c", b"abc a\x00c"),
        vec![(0, 3, 0), (4, 7, 0)]
    );
}

#[test]
fn classes_and_negation() {
    assert_eq!(
        hits("[0-9][^0-9]", b"a1b22c"),
        vec![(1, 3, 0), (4, 6, 0)]
    );
}

#[test]
fn binary_input_with_nul_bytes() {
    let mut input = vec![0u8; 64];
    input.extend_from_slice(b"key");
    input.extend_from_slice(&[0xFF, 0x00, 0x7F]);
    input.extend_from_slice(b"key");
    assert_eq!(hits("key", &input), vec![(64, 67, 0), (70, 73, 0)]);
}

#[test]
fn many_patterns_at_once() {
    let patterns: Vec<Pattern> = (0..50)
        .map(|i| Pattern::new(format!("pat{:02}x", i), i))
        .collect();
    let prog = compile_patterns(patterns).unwrap();
    let mut vm = Vm::new(&prog);
    let mut out = Vec::new();
    vm.search(b"zz pat07x .. pat42x zz", 0, &mut |h| {
        out.push((h.start, h.user_index))
    });
    vm.close_out(&mut |h| out.push((h.start, h.user_index)));
    assert_eq!(out, vec![(3, 7), (13, 42)]);
}

#[test]
fn error_chain_keeps_indices() {
    let err = compile_patterns(vec![
        Pattern::new("ok", 0),
        Pattern::new("(", 1),
        Pattern::new("\\x{1F600}", 2),
    ])
    .unwrap_err();
    assert_eq!(err.len(), 2);
    assert!(matches!(err.errors[0], Error::Parse { user_index: 1, .. }));
    assert!(matches!(
        err.errors[1],
        Error::NonRepresentable { user_index: 2, .. }
    ));
}

#[test]
fn unknown_encoding_reported() {
    let err = compile_patterns(vec![
        Pattern::new("a", 0).with_encodings(["KOI8-R"])
    ])
    .unwrap_err();
    assert!(matches!(err.errors[0], Error::UnknownEncoding { .. }));
}

#[test]
fn surrogate_rejected_by_unicode_encodings() {
    for enc in ["UTF-8", "UTF-16LE", "UTF-32BE"] {
        let err = compile_patterns(vec![
            Pattern::new("\\x{D800}", 0).with_encodings([enc])
        ])
        .unwrap_err();
        assert!(
            matches!(err.errors[0], Error::NonRepresentable { codepoint: 0xD800, .. }),
            "{} accepted a surrogate",
            enc
        );
    }
}
