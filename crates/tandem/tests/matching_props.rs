//! Property tests for the pattern-set matcher and ANSI stripping.

use proptest::prelude::*;
use tandem::encoding::strip_ansi;
use tandem::{find_match, Pattern};

fn sgr() -> impl Strategy<Value = String> {
    prop::collection::vec(0u8..108, 0..3).prop_map(|codes| {
        let params: Vec<String> = codes.iter().map(u8::to_string).collect();
        format!("\x1b[{}m", params.join(";"))
    })
}

/// Text with color codes sprinkled between its characters.
fn colored(text: String) -> impl Strategy<Value = String> {
    let len = text.chars().count();
    prop::collection::vec(prop::option::of(sgr()), len + 1).prop_map(move |codes| {
        let mut out = String::new();
        for (c, code) in text.chars().zip(&codes) {
            if let Some(code) = code {
                out.push_str(code);
            }
            out.push(c);
        }
        if let Some(Some(code)) = codes.last() {
            out.push_str(code);
        }
        out
    })
}

proptest! {
    #[test]
    fn stripping_removes_every_escape(text in "[a-z $>]{0,24}".prop_flat_map(colored)) {
        prop_assert!(!strip_ansi(&text).contains('\x1b'));
    }

    #[test]
    fn literal_span_strips_to_needle(
        (raw, needle) in ("[a-z ]{0,12}", "[a-z$>]{1,8}", "[a-z ]{0,12}")
            .prop_flat_map(|(prefix, needle, suffix)| {
                (colored(format!("{prefix}{needle}{suffix}")), Just(needle))
            }),
    ) {
        let patterns = [Pattern::literal(needle.clone()).unwrap()];
        let m = find_match(&raw, &patterns).unwrap().unwrap();
        let span = m.as_str(&raw);
        let stripped = strip_ansi(span);
        prop_assert_eq!(stripped.as_ref(), needle.as_str());
        prop_assert!(raw.is_char_boundary(m.start) && raw.is_char_boundary(m.end));
    }

    #[test]
    fn equal_starts_go_to_first_listed(
        needle in "[a-z]{1,6}",
        before in "[0-9 ]{0,10}",
        after in "[0-9 ]{0,10}",
        copies in 2usize..5,
    ) {
        let text = format!("{before}{needle}{after}");
        let patterns: Vec<Pattern> = (0..copies)
            .map(|_| Pattern::literal(needle.clone()).unwrap())
            .collect();
        let m = find_match(&text, &patterns).unwrap().unwrap();
        prop_assert_eq!(m.index, 0);
        prop_assert_eq!(m.start, before.len());
    }

    #[test]
    fn earliest_start_wins(
        first in "[a-m]{1,6}",
        second in "[n-z]{1,6}",
        gap in "[0-9 ]{0,10}",
        swap in any::<bool>(),
    ) {
        let text = format!("{first}{gap}{second}");
        let mut patterns = vec![
            Pattern::literal(first.clone()).unwrap(),
            Pattern::literal(second.clone()).unwrap(),
        ];
        if swap {
            patterns.reverse();
        }
        let m = find_match(&text, &patterns).unwrap().unwrap();
        prop_assert_eq!(m.start, 0);
        prop_assert_eq!(m.as_str(&text), first.as_str());
        prop_assert_eq!(m.index, usize::from(swap));
    }

    #[test]
    fn matching_is_pure(text in "[a-z0-9 \n]{0,40}", needle in "[a-z]{1,3}") {
        let patterns = [
            Pattern::literal(needle.clone()).unwrap(),
            Pattern::regex(r"\d+").unwrap(),
        ];
        let once = find_match(&text, &patterns).unwrap();
        let twice = find_match(&text, &patterns).unwrap();
        prop_assert_eq!(once, twice);
    }
}
