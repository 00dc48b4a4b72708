//! Property-based tests for index building and lattice search.
//!
//! Dictionaries are random rows over a four-letter alphabet where every
//! letter is a syllable, so any word of the right length is a valid row.

use std::sync::Arc;

use proptest::prelude::*;

use aipinyin_core::{
    CancellationToken, Config, DictRow, DictionaryIndex, Lattice, Segmentation, SyllableId,
    SyllableParser, Token, UnknownInput, UnknownPolicy,
};

#[derive(Debug)]
struct LetterParser;

impl SyllableParser for LetterParser {
    fn segment(&self, input: &str, policy: UnknownPolicy) -> Result<Segmentation, UnknownInput> {
        let mut seg = Segmentation::default();
        for (pos, ch) in input.char_indices() {
            if ('a'..='d').contains(&ch) {
                let text: Arc<str> = Arc::from(ch.to_string());
                seg.tokens.push(Token::syllable(
                    SyllableId(ch as u16 - 'a' as u16),
                    Arc::clone(&text),
                    text,
                    pos..pos + 1,
                ));
            } else if policy == UnknownPolicy::Reject {
                return Err(UnknownInput { position: pos, ch });
            } else {
                seg.unknown.push((pos, ch));
            }
        }
        Ok(seg)
    }
}

const HANZI: &[char] = &['甲', '乙', '丙', '丁', '戊'];

fn arb_row() -> impl Strategy<Value = DictRow> {
    (1usize..=3)
        .prop_flat_map(|len| {
            (
                prop::collection::vec(prop::sample::select(vec!['a', 'b', 'c', 'd']), len),
                prop::collection::vec(prop::sample::select(HANZI.to_vec()), len),
                0u32..1200,
            )
        })
        .prop_map(|(key, word, weight)| {
            DictRow::new(
                key.into_iter().collect::<String>(),
                word.into_iter().collect::<String>(),
                weight,
            )
        })
}

fn search(index: &DictionaryIndex, input: &str) -> Vec<(String, i64, Vec<(usize, usize)>)> {
    let config = Config::default();
    let seg = LetterParser.segment(input, UnknownPolicy::Drop).unwrap();
    Lattice::new(&seg.tokens, index, &config)
        .search(&CancellationToken::new())
        .unwrap()
        .into_iter()
        .map(|c| {
            let bounds = c.boundaries();
            (c.text, c.dict_score, bounds)
        })
        .collect()
}

proptest! {
    #[test]
    fn build_ignores_row_order(rows in prop::collection::vec(arb_row(), 0..40), seed in any::<u64>()) {
        let mut shuffled = rows.clone();
        // Deterministic Fisher-Yates driven by the seed.
        let mut state = seed | 1;
        for i in (1..shuffled.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            shuffled.swap(i, (state % (i as u64 + 1)) as usize);
        }

        let (a, _) = DictionaryIndex::build(rows, &LetterParser);
        let (b, _) = DictionaryIndex::build(shuffled, &LetterParser);
        let a: Vec<_> = a.iter().map(|(k, e)| (k.ids().to_vec(), e.clone())).collect();
        let b: Vec<_> = b.iter().map(|(k, e)| (k.ids().to_vec(), e.clone())).collect();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn entries_have_one_char_per_syllable(rows in prop::collection::vec(arb_row(), 0..40)) {
        let (index, _) = DictionaryIndex::build(rows, &LetterParser);
        for (key, entry) in index.iter() {
            prop_assert_eq!(entry.word.chars().count(), key.syllable_count());
            prop_assert!(entry.weight <= 999);
        }
    }

    #[test]
    fn paths_tile_the_input(
        rows in prop::collection::vec(arb_row(), 0..40),
        input in "[a-d]{0,8}",
    ) {
        let (index, _) = DictionaryIndex::build(rows, &LetterParser);
        let n = input.len();
        for (text, _, bounds) in search(&index, &input) {
            let mut pos = 0;
            for (start, end) in bounds {
                prop_assert_eq!(start, pos);
                prop_assert!(end > start);
                pos = end;
            }
            prop_assert_eq!(pos, n);
            prop_assert_eq!(text.chars().count(), n);
        }
    }

    #[test]
    fn search_is_deterministic(
        rows in prop::collection::vec(arb_row(), 0..40),
        input in "[a-d]{0,8}",
    ) {
        let (index, _) = DictionaryIndex::build(rows, &LetterParser);
        prop_assert_eq!(search(&index, &input), search(&index, &input));
    }

    #[test]
    fn results_are_sorted_and_distinct(
        rows in prop::collection::vec(arb_row(), 0..40),
        input in "[a-d]{1,8}",
    ) {
        let (index, _) = DictionaryIndex::build(rows, &LetterParser);
        let out = search(&index, &input);
        for pair in out.windows(2) {
            prop_assert!(pair[0].1 >= pair[1].1);
            prop_assert_ne!(&pair[0].0, &pair[1].0);
        }
    }
}
