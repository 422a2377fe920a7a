use serde::{Deserialize, Serialize};

/// Content category of a nut. Engines declare which categories they handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NutType {
    Html,
    Css,
    Javascript,
    Png,
    Jpg,
    Gif,
    Svg,
    Ico,
    Eot,
    Otf,
    Ttf,
    Woff,
    Woff2,
    Map,
    AppCache,
}

impl NutType {
    pub const ALL: [NutType; 15] = [
        NutType::Html,
        NutType::Css,
        NutType::Javascript,
        NutType::Png,
        NutType::Jpg,
        NutType::Gif,
        NutType::Svg,
        NutType::Ico,
        NutType::Eot,
        NutType::Otf,
        NutType::Ttf,
        NutType::Woff,
        NutType::Woff2,
        NutType::Map,
        NutType::AppCache,
    ];

    /// Extensions, dot included. The first one is used for synthetic names.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            NutType::Html => &[".html", ".htm"],
            NutType::Css => &[".css"],
            NutType::Javascript => &[".js"],
            NutType::Png => &[".png"],
            NutType::Jpg => &[".jpg", ".jpeg"],
            NutType::Gif => &[".gif"],
            NutType::Svg => &[".svg"],
            NutType::Ico => &[".ico"],
            NutType::Eot => &[".eot"],
            NutType::Otf => &[".otf"],
            NutType::Ttf => &[".ttf"],
            NutType::Woff => &[".woff"],
            NutType::Woff2 => &[".woff2"],
            NutType::Map => &[".map"],
            NutType::AppCache => &[".appcache"],
        }
    }

    pub fn extension(self) -> &'static str {
        self.extensions()[0]
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            NutType::Html => "text/html",
            NutType::Css => "text/css",
            NutType::Javascript => "text/javascript",
            NutType::Png => "image/png",
            NutType::Jpg => "image/jpeg",
            NutType::Gif => "image/gif",
            NutType::Svg => "image/svg+xml",
            NutType::Ico => "image/x-icon",
            NutType::Eot => "application/vnd.ms-fontobject",
            NutType::Otf => "font/otf",
            NutType::Ttf => "font/ttf",
            NutType::Woff => "font/woff",
            NutType::Woff2 => "font/woff2",
            NutType::Map => "application/json",
            NutType::AppCache => "text/cache-manifest",
        }
    }

    pub fn is_text(self) -> bool {
        matches!(
            self,
            NutType::Html
                | NutType::Css
                | NutType::Javascript
                | NutType::Svg
                | NutType::Map
                | NutType::AppCache
        )
    }

    pub fn is_image(self) -> bool {
        matches!(
            self,
            NutType::Png | NutType::Jpg | NutType::Gif | NutType::Svg | NutType::Ico
        )
    }

    /// Detects the type from the extension of a path, ignoring case.
    pub fn from_path(path: &str) -> Option<NutType> {
        let lower = path.to_ascii_lowercase();
        NutType::ALL
            .into_iter()
            .find(|t| t.extensions().iter().any(|ext| lower.ends_with(ext)))
    }
}

impl std::fmt::Display for NutType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path() {
        assert_eq!(NutType::from_path("css/app.CSS"), Some(NutType::Css));
        assert_eq!(NutType::from_path("img/a.jpeg"), Some(NutType::Jpg));
        assert_eq!(NutType::from_path("fonts/f.woff2"), Some(NutType::Woff2));
        assert_eq!(NutType::from_path("README"), None);
    }

    #[test]
    fn test_woff_does_not_shadow_woff2() {
        assert_eq!(NutType::from_path("f.woff"), Some(NutType::Woff));
    }
}
