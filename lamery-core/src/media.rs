//! Extension-based media classification and subtitle language names

use serde::{Deserialize, Serialize};

/// Sidecar subtitle formats understood by the transcoder
pub const SUBTITLE_EXTENSIONS: &[&str] = &[".ass", ".ssa", ".srt", ".vtt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Word,
    Text,
    Video,
    Powerpoint,
    Pdf,
    Image,
    Excel,
    Code,
    Audio,
    Archive,
    Other,
}

impl FileType {
    /// Classify a lowercased extension (with leading dot)
    pub fn from_ext(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            ".doc" | ".docx" | ".gdoc" | ".odt" | ".rtf" | ".wpd" => Self::Word,

            ".tex" | ".text" | ".txt" | ".md" | ".markdown" | ".json" | ".cfg" | ".config"
            | ".ini" | ".info" | ".log" | ".inf" | ".xml" | ".yml" | ".yaml" | ".tml"
            | ".toml" => Self::Text,

            ".3g2" | ".3gp" | ".avi" | ".flv" | ".h264" | ".m4v" | ".mkv" | ".mov" | ".mp4"
            | ".mpg" | ".mpeg" | ".rm" | ".swf" | ".vob" | ".wmv" | ".webm" => Self::Video,

            ".pot" | ".potm" | ".potx" | ".ppa" | ".ppam" | ".pps" | ".ppsm" | ".ppsx"
            | ".ppt" | ".pptm" | ".pptx" => Self::Powerpoint,

            ".pdf" => Self::Pdf,

            ".jpg" | ".jpeg" | ".png" | ".gif" | ".webp" | ".tif" | ".tiff" | ".bmp" | ".heif"
            | ".svg" | ".eps" | ".ps" | ".psd" | ".ai" | ".xcf" | ".indd" | ".ico" | ".img"
            | ".raw" | ".sai" => Self::Image,

            ".csv" | ".ods" | ".xls" | ".xlsm" | ".xlsx" => Self::Excel,

            ".bat" | ".c" | ".cgi" | ".class" | ".cmd" | ".cpp" | ".cs" | ".css" | ".d" | ".go"
            | ".h" | ".hpp" | ".java" | ".js" | ".jsx" | ".kt" | ".m" | ".make" | ".php"
            | ".pl" | ".py" | ".r" | ".rb" | ".rs" | ".scala" | ".sh" | ".sql" | ".swift"
            | ".ts" | ".tsx" | ".vb" | ".xaml" => Self::Code,

            ".aif" | ".cda" | ".flac" | ".mid" | ".midi" | ".mp3" | ".mpa" | ".ogg" | ".wav"
            | ".wma" | ".wpl" => Self::Audio,

            ".7z" | ".arj" | ".deb" | ".gz" | ".pkg" | ".rar" | ".rpm" | ".tar" | ".z"
            | ".zip" => Self::Archive,

            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Word => "word",
            Self::Text => "text",
            Self::Video => "video",
            Self::Powerpoint => "powerpoint",
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Excel => "excel",
            Self::Code => "code",
            Self::Audio => "audio",
            Self::Archive => "archive",
            Self::Other => "other",
        }
    }
}

pub fn is_subtitle_ext(ext: &str) -> bool {
    SUBTITLE_EXTENSIONS.contains(&ext)
}

/// (ISO 639-1, ISO 639-2/B, English name)
const LANGUAGES: &[(&str, &str, &str)] = &[
    ("ar", "ara", "Arabic"),
    ("bg", "bul", "Bulgarian"),
    ("ca", "cat", "Catalan"),
    ("cs", "cze", "Czech"),
    ("da", "dan", "Danish"),
    ("de", "ger", "German"),
    ("el", "gre", "Greek"),
    ("en", "eng", "English"),
    ("es", "spa", "Spanish"),
    ("et", "est", "Estonian"),
    ("fa", "per", "Persian"),
    ("fi", "fin", "Finnish"),
    ("fr", "fre", "French"),
    ("he", "heb", "Hebrew"),
    ("hi", "hin", "Hindi"),
    ("hr", "hrv", "Croatian"),
    ("hu", "hun", "Hungarian"),
    ("id", "ind", "Indonesian"),
    ("is", "ice", "Icelandic"),
    ("it", "ita", "Italian"),
    ("ja", "jpn", "Japanese"),
    ("ko", "kor", "Korean"),
    ("lt", "lit", "Lithuanian"),
    ("lv", "lav", "Latvian"),
    ("ms", "may", "Malay"),
    ("nl", "dut", "Dutch"),
    ("no", "nor", "Norwegian"),
    ("pl", "pol", "Polish"),
    ("pt", "por", "Portuguese"),
    ("ro", "rum", "Romanian"),
    ("ru", "rus", "Russian"),
    ("sk", "slo", "Slovak"),
    ("sl", "slv", "Slovenian"),
    ("sr", "srp", "Serbian"),
    ("sv", "swe", "Swedish"),
    ("th", "tha", "Thai"),
    ("tl", "tgl", "Tagalog"),
    ("tr", "tur", "Turkish"),
    ("uk", "ukr", "Ukrainian"),
    ("vi", "vie", "Vietnamese"),
    ("zh", "chi", "Chinese"),
];

/// English name for a two-letter ISO 639-1 code
pub fn language_name_iso6391(code: &str) -> Option<&'static str> {
    let code = code.to_lowercase();
    LANGUAGES
        .iter()
        .find(|(iso1, _, _)| *iso1 == code)
        .map(|(_, _, name)| *name)
}

/// English name for a three-letter ISO 639-2/B code (as found in container tags)
pub fn language_name_iso6392(code: &str) -> Option<&'static str> {
    let code = code.to_lowercase();
    LANGUAGES
        .iter()
        .find(|(_, iso2, _)| *iso2 == code)
        .map(|(_, _, name)| *name)
}
