//! # Utility Functions Module
//!
//! Helpers for building argument lists for the external video tools.

/// Converts any iterable of string-like items to `Vec<String>`.
///
/// # Example
/// ```rust
/// use secure_media_compressor::utils::to_string_vec;
///
/// let bitrate = format!("{}k", 800);
/// let args = to_string_vec(["-c:v", "libvpx-vp9", "-b:v", bitrate.as_str()]);
/// assert_eq!(args[3], "800k");
/// ```
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// `to_string_vec` over a literal list. All items must share one type,
/// so pass owned strings as `.as_str()`.
///
/// # Example
/// ```rust
/// use secure_media_compressor::args;
///
/// let args = args!["-hide_banner", "-y"];
/// assert_eq!(args, vec!["-hide_banner".to_string(), "-y".to_string()]);
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        $crate::utils::to_string_vec([$($item),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_string_vec_numbers() {
        assert_eq!(to_string_vec([1280u32, 720]), vec!["1280".to_string(), "720".to_string()]);
    }

    #[test]
    fn test_to_string_vec_empty() {
        let result: Vec<String> = to_string_vec(Vec::<&str>::new());
        assert!(result.is_empty());
    }

    #[test]
    fn test_args_macro_with_borrowed_strings() {
        let scale = format!("scale={}:{}", 640, 360);
        let result = args!["-vf", scale.as_str(), "-an",];
        assert_eq!(result, vec!["-vf".to_string(), "scale=640:360".to_string(), "-an".to_string()]);
    }
}
