use tracing::debug;

use crate::error::Result;

/// Seam for checking that a font family is usable for subtitle burn-in.
///
/// The pipeline asks for every distinct family before rendering; a
/// failure is fatal when subtitles are enabled, since the burn-in would
/// silently fall back to whatever the system substitutes.
pub trait FontProvider: Send + Sync {
    fn ensure_available(&self, family: &str) -> Result<()>;
}

/// Trusts that the named family is installed. Suitable for library use
/// where font management happens outside the export.
#[derive(Debug, Default)]
pub struct SystemFonts;

impl FontProvider for SystemFonts {
    fn ensure_available(&self, family: &str) -> Result<()> {
        debug!("Assuming font family '{family}' is installed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_fonts_is_permissive() {
        let fonts = SystemFonts;
        assert!(fonts.ensure_available("Roboto").is_ok());
        assert!(fonts.ensure_available("Noto Sans Tamil").is_ok());
    }
}
