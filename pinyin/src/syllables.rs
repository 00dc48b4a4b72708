//! The pinyin syllable alphabet.
//!
//! One canonical table of toneless Mandarin syllables, interned into
//! [`SyllableId`]s and validated once when the table is built.

use std::sync::Arc;

use aipinyin_core::{SyllableId, TrieNode};
use once_cell::sync::Lazy;
use thiserror::Error;

/// Consonant initials (声母), usable on their own as simple-pinyin shorthand.
pub static INITIALS: phf::Set<&'static str> = phf::phf_set! {
    "b", "p", "m", "f", "d", "t", "n", "l", "g", "k", "h", "j", "q", "x",
    "zh", "ch", "sh", "r", "z", "c", "s", "y", "w",
};

/// All standard pinyin syllables (without tone markers).
pub const PINYIN_SYLLABLES: &[&str] = &[
    "a", "ai", "an", "ang", "ao", "ba", "bai", "ban", "bang", "bao", "bei", "ben", "beng", "bi",
    "bian", "biao", "bie", "bin", "bing", "bo", "bu", "ca", "cai", "can", "cang", "cao", "ce",
    "cen", "ceng", "cha", "chai", "chan", "chang", "chao", "che", "chen", "cheng", "chi", "chong",
    "chou", "chu", "chua", "chuai", "chuan", "chuang", "chui", "chun", "chuo", "ci", "cong", "cou",
    "cu", "cuan", "cui", "cun", "cuo", "da", "dai", "dan", "dang", "dao", "de", "dei", "den",
    "deng", "di", "dia", "dian", "diao", "die", "ding", "diu", "dong", "dou", "du", "duan", "dui",
    "dun", "duo", "e", "ei", "en", "eng", "er", "fa", "fan", "fang", "fei", "fen", "feng", "fo",
    "fou", "fu", "ga", "gai", "gan", "gang", "gao", "ge", "gei", "gen", "geng", "gong", "gou",
    "gu", "gua", "guai", "guan", "guang", "gui", "gun", "guo", "ha", "hai", "han", "hang", "hao",
    "he", "hei", "hen", "heng", "hong", "hou", "hu", "hua", "huai", "huan", "huang", "hui", "hun",
    "huo", "ji", "jia", "jian", "jiang", "jiao", "jie", "jin", "jing", "jiong", "jiu", "ju",
    "juan", "jue", "jun", "ka", "kai", "kan", "kang", "kao", "ke", "kei", "ken", "keng", "kong",
    "kou", "ku", "kua", "kuai", "kuan", "kuang", "kui", "kun", "kuo", "la", "lai", "lan", "lang",
    "lao", "le", "lei", "leng", "li", "lia", "lian", "liang", "liao", "lie", "lin", "ling", "liu",
    "lo", "long", "lou", "lu", "luan", "lun", "luo", "lv", "lve", "ma", "mai", "man", "mang",
    "mao", "me", "mei", "men", "meng", "mi", "mian", "miao", "mie", "min", "ming", "miu", "mo",
    "mou", "mu", "na", "nai", "nan", "nang", "nao", "ne", "nei", "nen", "neng", "ng", "ni", "nian",
    "niang", "niao", "nie", "nin", "ning", "niu", "nong", "nou", "nu", "nuan", "nuo", "nv", "nve",
    "o", "ou", "pa", "pai", "pan", "pang", "pao", "pei", "pen", "peng", "pi", "pian", "piao",
    "pie", "pin", "ping", "po", "pou", "pu", "qi", "qia", "qian", "qiang", "qiao", "qie", "qin",
    "qing", "qiong", "qiu", "qu", "quan", "que", "qun", "ran", "rang", "rao", "re", "ren", "reng",
    "ri", "rong", "rou", "ru", "rua", "ruan", "rui", "run", "ruo", "sa", "sai", "san", "sang",
    "sao", "se", "sen", "seng", "sha", "shai", "shan", "shang", "shao", "she", "shei", "shen",
    "sheng", "shi", "shou", "shu", "shua", "shuai", "shuan", "shuang", "shui", "shun", "shuo",
    "si", "song", "sou", "su", "suan", "sui", "sun", "suo", "ta", "tai", "tan", "tang", "tao",
    "te", "teng", "ti", "tian", "tiao", "tie", "ting", "tong", "tou", "tu", "tuan", "tui", "tun",
    "tuo", "wa", "wai", "wan", "wang", "wei", "wen", "weng", "wo", "wu", "xi", "xia", "xian",
    "xiang", "xiao", "xie", "xin", "xing", "xiong", "xiu", "xu", "xuan", "xue", "xun", "ya", "yan",
    "yang", "yao", "ye", "yi", "yin", "ying", "yo", "yong", "you", "yu", "yuan", "yue", "yun",
    "za", "zai", "zan", "zang", "zao", "ze", "zei", "zen", "zeng", "zha", "zhai", "zhan", "zhang",
    "zhao", "zhe", "zhei", "zhen", "zheng", "zhi", "zhong", "zhou", "zhu", "zhua", "zhuai",
    "zhuan", "zhuang", "zhui", "zhun", "zhuo", "zi", "zong", "zou", "zu", "zuan", "zui", "zun",
    "zuo",
];


static STANDARD: Lazy<Arc<SyllableTable>> = Lazy::new(|| {
    // The built-in list is covered by `standard_table_is_valid`.
    Arc::new(SyllableTable::new(PINYIN_SYLLABLES).expect("built-in pinyin table is valid"))
});

/// A table entry failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("syllable #{0} is empty")]
    Empty(usize),
    #[error("syllable {0:?} is not lowercase ASCII")]
    NotLowercase(String),
    #[error("syllable {0:?} is listed twice")]
    Duplicate(String),
    #[error("syllable {0:?} starts with neither an initial nor a vowel")]
    BadStart(String),
    #[error("syllable {0:?} is a bare initial")]
    BareInitial(String),
    #[error("table has {0} syllables, more than an id can address")]
    TooLarge(usize),
}

#[derive(Debug)]
struct Entry {
    text: Arc<str>,
    initial: Arc<str>,
}

/// Interned, validated syllable alphabet with a trie for longest-match lookup.
#[derive(Debug)]
pub struct SyllableTable {
    trie: TrieNode,
    entries: Vec<Entry>,
}

impl SyllableTable {
    /// Build and validate a table. Ids follow the order of `syllables`.
    pub fn new(syllables: &[&str]) -> Result<Self, TableError> {
        if syllables.len() > usize::from(u16::MAX) {
            return Err(TableError::TooLarge(syllables.len()));
        }
        let mut trie = TrieNode::new();
        let mut entries = Vec::with_capacity(syllables.len());

        for (i, &s) in syllables.iter().enumerate() {
            if s.is_empty() {
                return Err(TableError::Empty(i));
            }
            if !s.bytes().all(|b| b.is_ascii_lowercase()) {
                return Err(TableError::NotLowercase(s.to_string()));
            }
            if trie.contains_word(s) {
                return Err(TableError::Duplicate(s.to_string()));
            }
            let initial = match initial_of(s) {
                // Bare initials are reserved for simple-pinyin tokens.
                Some(initial) if initial == s => return Err(TableError::BareInitial(s.to_string())),
                Some(initial) => initial,
                None if s.starts_with(|c: char| matches!(c, 'a' | 'e' | 'o')) => &s[..1],
                None => return Err(TableError::BadStart(s.to_string())),
            };
            trie.insert(s, SyllableId(i as u16));
            entries.push(Entry {
                text: Arc::from(s),
                initial: Arc::from(initial),
            });
        }

        Ok(Self { trie, entries })
    }

    /// The built-in Mandarin table, shared.
    pub fn standard() -> Arc<SyllableTable> {
        Arc::clone(&STANDARD)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn id(&self, syllable: &str) -> Option<SyllableId> {
        self.trie.get(syllable)
    }

    pub fn text(&self, id: SyllableId) -> Option<&str> {
        self.entries.get(usize::from(id.0)).map(|e| &*e.text)
    }

    pub(crate) fn text_arc(&self, id: SyllableId) -> Option<&Arc<str>> {
        self.entries.get(usize::from(id.0)).map(|e| &e.text)
    }

    /// Initial of a syllable; zero-initial syllables report their first letter.
    pub fn initial(&self, id: SyllableId) -> Option<&str> {
        self.initial_arc(id).map(|s| &**s)
    }

    pub(crate) fn initial_arc(&self, id: SyllableId) -> Option<&Arc<str>> {
        self.entries.get(usize::from(id.0)).map(|e| &e.initial)
    }

    /// Longest syllable starting at `start`, as `(end, id)`.
    pub fn longest_match(&self, input: &[char], start: usize) -> Option<(usize, SyllableId)> {
        self.trie.longest_prefix(input, start)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SyllableId, &str)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (SyllableId(i as u16), &*e.text))
    }
}

/// Longest initial that `s` starts with (`zh` before `z`).
pub fn initial_of(s: &str) -> Option<&str> {
    [2, 1]
        .into_iter()
        .filter(|&n| s.len() >= n && s.is_char_boundary(n))
        .map(|n| &s[..n])
        .find(|prefix| INITIALS.contains(*prefix))
}
