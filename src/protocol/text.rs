//! Fixed-width text layout.

use super::commands::Alignment;

/// Emphasis and justification for a block of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextStyle {
    /// Emphasized printing.
    pub bold: bool,
    /// Justification.
    pub align: Alignment,
}

impl TextStyle {
    /// Bold, left-aligned.
    pub fn bold() -> Self {
        Self {
            bold: true,
            align: Alignment::Left,
        }
    }

    /// Plain, centered.
    pub fn centered() -> Self {
        Self {
            bold: false,
            align: Alignment::Center,
        }
    }
}

/// Lay out `left` and `right` on one line of `width` characters with
/// `right` flush right.
///
/// When the two do not fit with at least one space between them, `left` is
/// cut to `width - len(right) - 1` characters. Lengths count characters,
/// not bytes.
///
/// ```
/// use thermal_printer_ble::protocol::two_columns;
///
/// let line = two_columns("Coffee x2", "$5.00", 32);
/// assert_eq!(line.chars().count(), 32);
/// assert!(line.ends_with("$5.00"));
/// ```
pub fn two_columns(left: &str, right: &str, width: usize) -> String {
    let left_len = left.chars().count();
    let right_len = right.chars().count();

    if left_len + right_len < width {
        let padding = width - left_len - right_len;
        let mut line = String::with_capacity(left.len() + padding + right.len());
        line.push_str(left);
        line.extend(std::iter::repeat(' ').take(padding));
        line.push_str(right);
        return line;
    }

    let keep = width.saturating_sub(right_len + 1);
    let mut line: String = left.chars().take(keep).collect();
    line.push(' ');
    line.push_str(right);
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_receipt_line() {
        let line = two_columns("Coffee x2", "$5.00", 32);
        assert_eq!(line, "Coffee x2                  $5.00");
        assert_eq!(line.chars().count(), 32);
    }

    #[test]
    fn test_truncates_long_left() {
        let line = two_columns("Extra large caramel macchiato", "$12.50", 20);
        assert_eq!(line, "Extra large c $12.50");
        assert_eq!(line.chars().count(), 20);
    }

    #[test]
    fn test_exact_fit_still_truncates() {
        // 10 + 6 == 16 leaves no room for a separator.
        let line = two_columns("0123456789", "abcdef", 16);
        assert_eq!(line, "012345678 abcdef");
    }

    #[test]
    fn test_multibyte_counts_chars() {
        let line = two_columns("Café", "€3", 10);
        assert_eq!(line, "Café    €3");
        assert_eq!(line.chars().count(), 10);
    }

    proptest! {
        #[test]
        fn prop_fits_budget(left in "[a-zA-Z0-9 ]{0,60}", right in "[$0-9.]{1,10}", width in 12usize..64) {
            let line = two_columns(&left, &right, width);
            prop_assert!(line.ends_with(&right));
            prop_assert_eq!(line.chars().count(), width.max(right.chars().count() + 1));
        }
    }
}
