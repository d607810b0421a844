//! Host wildcard matching for directory listings.
//!
//! Beyond `*` and `?`, hosts pass the DOS wildcards produced by legacy
//! pattern translation:
//! - `<` matches zero or more characters but never the final `.` of the name
//! - `>` matches one character, or nothing at a `.` or the end of the name
//! - `"` matches a `.`, or nothing at the end of the name
//!
//! Matching is case-insensitive.

/// Check whether `name` matches the host `pattern`.
///
/// An empty pattern matches everything, like `*`.
pub fn is_name_in_expression(pattern: &str, name: &str) -> bool {
    if pattern.is_empty() || pattern == "*" {
        return true;
    }
    let pattern: Vec<char> = pattern.chars().flat_map(char::to_uppercase).collect();
    let name: Vec<char> = name.chars().flat_map(char::to_uppercase).collect();
    Matcher::new(&pattern, &name).matches(0, 0)
}

/// Backtracking matcher with one memo slot per (pattern, name) position,
/// so each pair is decided once however many stars the pattern holds.
struct Matcher<'a> {
    pattern: &'a [char],
    name: &'a [char],
    last_dot: Option<usize>,
    memo: Vec<Option<bool>>,
}

impl<'a> Matcher<'a> {
    fn new(pattern: &'a [char], name: &'a [char]) -> Self {
        Self {
            pattern,
            name,
            last_dot: name.iter().rposition(|c| *c == '.'),
            memo: vec![None; (pattern.len() + 1) * (name.len() + 1)],
        }
    }

    fn matches(&mut self, pi: usize, ni: usize) -> bool {
        let slot = pi * (self.name.len() + 1) + ni;
        if let Some(known) = self.memo[slot] {
            return known;
        }
        let result = self.step(pi, ni);
        self.memo[slot] = Some(result);
        result
    }

    fn step(&mut self, pi: usize, ni: usize) -> bool {
        let Some(&token) = self.pattern.get(pi) else {
            return ni == self.name.len();
        };
        match token {
            '*' => (ni..=self.name.len()).any(|k| self.matches(pi + 1, k)),
            '<' => {
                let limit = match self.last_dot {
                    Some(dot) if dot >= ni => dot,
                    _ => self.name.len(),
                };
                (ni..=limit).any(|k| self.matches(pi + 1, k))
            }
            '?' => ni < self.name.len() && self.matches(pi + 1, ni + 1),
            '>' => match self.name.get(ni).copied() {
                Some('.') | None => self.matches(pi + 1, ni),
                Some(_) => self.matches(pi + 1, ni + 1),
            },
            '"' => match self.name.get(ni).copied() {
                Some('.') => self.matches(pi + 1, ni + 1),
                None => self.matches(pi + 1, ni),
                Some(_) => false,
            },
            literal => self.name.get(ni) == Some(&literal) && self.matches(pi + 1, ni + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_and_question() {
        assert!(is_name_in_expression("*", "anything.txt"));
        assert!(is_name_in_expression("*.txt", "notes.txt"));
        assert!(!is_name_in_expression("*.txt", "notes.md"));
        assert!(is_name_in_expression("n?tes.*", "notes.md"));
        assert!(!is_name_in_expression("n?tes", "ntes"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(is_name_in_expression("*.TXT", "notes.txt"));
        assert!(is_name_in_expression("README", "readme"));
    }

    #[test]
    fn test_dos_star_stops_at_final_dot() {
        assert!(is_name_in_expression("<.txt", "archive.tar.txt"));
        assert!(is_name_in_expression("<", "noext"));
        assert!(!is_name_in_expression("<", "file.txt"));
        assert!(is_name_in_expression("<.*", "file.txt"));
    }

    #[test]
    fn test_dos_qm_and_dot() {
        // `>` pads short names in 8.3 patterns
        assert!(is_name_in_expression("ab>>>>>>\"txt", "ab.txt"));
        assert!(is_name_in_expression("abc>", "abc"));
        assert!(is_name_in_expression("abc>", "abcd"));
        assert!(is_name_in_expression("file\"*", "file"));
        assert!(is_name_in_expression("file\"*", "file.rs"));
        assert!(!is_name_in_expression("file\"", "filex"));
    }

    #[test]
    fn test_many_stars_on_long_name_stay_fast() {
        let name = "a".repeat(255);
        let started = std::time::Instant::now();
        assert!(!is_name_in_expression("*a*a*a*a*a*a*a*a*a*a*a*a*b", &name));
        assert!(!is_name_in_expression("<a<a<a<a<a<a<a<a<a<a<a<a.b", &name));
        assert!(is_name_in_expression("*a*a*a*a*a*a*a*a*a*a*a*a*", &name));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_empty_pattern_matches_all() {
        assert!(is_name_in_expression("", "x"));
    }
}
