//! Version constraint handling.
//!
//! Versions are dot-separated numeric components; missing components
//! compare as zero, so `1.2` equals `1.2.0`. Constraints are one of the
//! comparison operators followed by a version, or a bare version meaning
//! equality.

use std::cmp::Ordering;

/// Compare two dot-separated numeric versions. Components that fail to
/// parse as numbers compare as zero.
pub fn compare(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|c| {
                let digits: String = c.chars().take_while(|ch| ch.is_ascii_digit()).collect();
                digits.parse::<u64>().unwrap_or(0)
            })
            .collect()
    };
    let left = parse(a);
    let right = parse(b);
    let len = left.len().max(right.len());
    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Does `version` satisfy one constraint such as `>=1.2.3`?
pub fn satisfies(version: &str, constraint: &str) -> bool {
    let constraint = constraint.trim();
    let (op, wanted) = if let Some(rest) = constraint.strip_prefix(">=") {
        (">=", rest)
    } else if let Some(rest) = constraint.strip_prefix("<=") {
        ("<=", rest)
    } else if let Some(rest) = constraint.strip_prefix("==") {
        ("==", rest)
    } else if let Some(rest) = constraint.strip_prefix("!=") {
        ("!=", rest)
    } else if let Some(rest) = constraint.strip_prefix('>') {
        (">", rest)
    } else if let Some(rest) = constraint.strip_prefix('<') {
        ("<", rest)
    } else {
        ("==", constraint)
    };
    let ord = compare(version, wanted.trim());
    match op {
        ">=" => ord != Ordering::Less,
        "<=" => ord != Ordering::Greater,
        "==" => ord == Ordering::Equal,
        "!=" => ord != Ordering::Equal,
        ">" => ord == Ordering::Greater,
        "<" => ord == Ordering::Less,
        _ => unreachable!(),
    }
}

/// Does `version` satisfy every constraint in the list?
pub fn satisfies_all(version: &str, constraints: &[String]) -> bool {
    constraints.iter().all(|c| satisfies(version, c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_basic() {
        assert_eq!(compare("1.2.3", "1.2.3"), Ordering::Equal);
        assert_eq!(compare("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare("2", "10"), Ordering::Less);
    }

    #[test]
    fn test_satisfies_operators() {
        assert!(satisfies("1.2.3", ">=1.2"));
        assert!(satisfies("1.2.3", "<2"));
        assert!(satisfies("1.2.3", "!=1.2.4"));
        assert!(satisfies("1.2.3", "1.2.3"));
        assert!(!satisfies("1.2.3", ">1.2.3"));
        assert!(!satisfies("1.2.3", "<=1.2.2"));
    }

    #[test]
    fn test_satisfies_all() {
        let constraints = vec![">=1.0".to_string(), "<2.0".to_string()];
        assert!(satisfies_all("1.5", &constraints));
        assert!(!satisfies_all("2.1", &constraints));
    }
}
