use radix_trie::Trie;

/// The configured reverse prompts, indexed by their reversed bytes so a single
/// ancestor lookup on the reversed output tail finds any matching suffix.
#[derive(Debug, Default)]
pub struct Antiprompts {
    prompts: Vec<String>,
    reversed: Trie<Vec<u8>, usize>,
    longest: usize,
    has_empty: bool,
}

impl Antiprompts {
    pub fn new(prompts: Vec<String>) -> Self {
        let mut reversed = Trie::new();
        let mut has_empty = false;

        for (i, prompt) in prompts.iter().enumerate() {
            if prompt.is_empty() {
                has_empty = true;
                continue;
            }
            let key: Vec<u8> = prompt.bytes().rev().collect();
            if reversed.get(&key).is_none() {
                reversed.insert(key, i);
            }
        }

        let longest = prompts.iter().map(String::len).max().unwrap_or(0);

        Self {
            prompts,
            reversed,
            longest,
            has_empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.prompts.first().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.prompts.iter().map(String::as_str)
    }

    /// Byte length of the longest configured prompt.
    pub fn longest(&self) -> usize {
        self.longest
    }

    /// Index of a configured prompt that the rendered output `text` ends
    /// with. Matching is on bytes, so a tail that splits a character still
    /// compares correctly.
    pub fn match_suffix(&self, text: &[u8]) -> Option<usize> {
        if self.prompts.is_empty() {
            return None;
        }

        let tail: Vec<u8> = text.iter().rev().take(self.longest).copied().collect();
        if let Some(&i) = self.reversed.get_ancestor_value(&tail) {
            return Some(i);
        }

        if self.has_empty {
            return self.prompts.iter().position(String::is_empty);
        }
        None
    }
}
