use chrono::Utc;

/// Folds Vietnamese letters to ASCII and produces a URL-safe slug.
pub fn slugify(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_dash = true;
    for ch in value.chars() {
        match fold_char(ch) {
            Some(c) if c.is_ascii_alphanumeric() => {
                out.push(c.to_ascii_lowercase());
                last_dash = false;
            }
            _ => {
                if !last_dash {
                    out.push('-');
                    last_dash = true;
                }
            }
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Story slugs get a millisecond suffix so repeated titles stay unique.
pub fn story_slug(title: &str) -> String {
    let base = slugify(title);
    let millis = Utc::now().timestamp_millis();
    if base.is_empty() {
        format!("story-{millis}")
    } else {
        format!("{base}-{millis}")
    }
}

pub fn order_number() -> String {
    format!("ORD-{}", Utc::now().timestamp_millis())
}

/// Collapses runs of whitespace into single spaces and trims.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_char(ch: char) -> Option<char> {
    if ch.is_ascii() {
        return Some(ch);
    }
    let folded = match ch {
        'à' | 'á' | 'ả' | 'ã' | 'ạ' | 'ă' | 'ằ' | 'ắ' | 'ẳ' | 'ẵ' | 'ặ' | 'â' | 'ầ' | 'ấ'
        | 'ẩ' | 'ẫ' | 'ậ' => 'a',
        'À' | 'Á' | 'Ả' | 'Ã' | 'Ạ' | 'Ă' | 'Ằ' | 'Ắ' | 'Ẳ' | 'Ẵ' | 'Ặ' | 'Â' | 'Ầ' | 'Ấ'
        | 'Ẩ' | 'Ẫ' | 'Ậ' => 'A',
        'è' | 'é' | 'ẻ' | 'ẽ' | 'ẹ' | 'ê' | 'ề' | 'ế' | 'ể' | 'ễ' | 'ệ' => 'e',
        'È' | 'É' | 'Ẻ' | 'Ẽ' | 'Ẹ' | 'Ê' | 'Ề' | 'Ế' | 'Ể' | 'Ễ' | 'Ệ' => 'E',
        'ì' | 'í' | 'ỉ' | 'ĩ' | 'ị' => 'i',
        'Ì' | 'Í' | 'Ỉ' | 'Ĩ' | 'Ị' => 'I',
        'ò' | 'ó' | 'ỏ' | 'õ' | 'ọ' | 'ô' | 'ồ' | 'ố' | 'ổ' | 'ỗ' | 'ộ' | 'ơ' | 'ờ' | 'ớ'
        | 'ở' | 'ỡ' | 'ợ' => 'o',
        'Ò' | 'Ó' | 'Ỏ' | 'Õ' | 'Ọ' | 'Ô' | 'Ồ' | 'Ố' | 'Ổ' | 'Ỗ' | 'Ộ' | 'Ơ' | 'Ờ' | 'Ớ'
        | 'Ở' | 'Ỡ' | 'Ợ' => 'O',
        'ù' | 'ú' | 'ủ' | 'ũ' | 'ụ' | 'ư' | 'ừ' | 'ứ' | 'ử' | 'ữ' | 'ự' => 'u',
        'Ù' | 'Ú' | 'Ủ' | 'Ũ' | 'Ụ' | 'Ư' | 'Ừ' | 'Ứ' | 'Ử' | 'Ữ' | 'Ự' => 'U',
        'ỳ' | 'ý' | 'ỷ' | 'ỹ' | 'ỵ' => 'y',
        'Ỳ' | 'Ý' | 'Ỷ' | 'Ỹ' | 'Ỵ' => 'Y',
        'đ' => 'd',
        'Đ' => 'D',
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_folds_vietnamese() {
        assert_eq!(
            slugify("Kỷ niệm đáng nhớ từ Sắc Hội Trăng Thu"),
            "ky-niem-dang-nho-tu-sac-hoi-trang-thu"
        );
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Hội  An --- 2024!  "), "hoi-an-2024");
    }

    #[test]
    fn slugify_drops_unmapped_symbols() {
        assert_eq!(slugify("€✨"), "");
    }

    #[test]
    fn story_slug_always_has_suffix() {
        assert!(story_slug("").starts_with("story-"));
        assert!(story_slug("Hành trình").starts_with("hanh-trinh-"));
    }

    #[test]
    fn order_number_shape() {
        let number = order_number();
        assert!(number.starts_with("ORD-"));
        assert!(number[4..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn collapse_whitespace_trims_runs() {
        assert_eq!(collapse_whitespace("  a \t b\n c "), "a b c");
    }
}
