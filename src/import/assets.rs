//! Asset enrichment: image dimensions and animation flags.
//!
//! Both steps are advisory. A buffer the image decoder cannot read keeps
//! its dimensions unset and the import goes on.

use std::io::Cursor;

use image::ImageReader;
use memchr::memmem;
use tracing::warn;

use crate::card::{ParsedAsset, ANIMATED_TAG};

const WEBP_MIME: &str = "image/webp";
const GIF_MIME: &str = "image/gif";
const WEBP_ANIMATION_CHUNK: &[u8] = b"ANIM";
const GIF_LOOP_EXTENSION: &[u8] = b"NETSCAPE2.0";
const GIF_GRAPHIC_CONTROL: &[u8] = &[0x21, 0xF9, 0x04];

/// Fills in dimensions and tags animated images. Running it again on its own
/// output changes nothing.
pub fn process_asset(mut asset: ParsedAsset) -> ParsedAsset {
    if asset.is_image() && !asset.has_dimensions() {
        match probe_dimensions(&asset.data) {
            Ok((width, height)) => {
                asset.width = Some(width);
                asset.height = Some(height);
            }
            Err(reason) => {
                warn!(file = %asset.filename, %reason, "could not read image dimensions");
            }
        }
    }

    if !asset.link.has_tag(ANIMATED_TAG) && is_animated(&asset.mimetype, &asset.data) {
        asset.link.add_tag(ANIMATED_TAG);
    }
    asset
}

fn probe_dimensions(data: &[u8]) -> Result<(u32, u32), String> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|err| err.to_string())?
        .into_dimensions()
        .map_err(|err| err.to_string())
}

/// Animated WebP carries an `ANIM` chunk; animated GIF has a looping
/// extension or more than one graphic control block.
pub fn is_animated(mimetype: &str, data: &[u8]) -> bool {
    match mimetype {
        WEBP_MIME => memmem::find(data, WEBP_ANIMATION_CHUNK).is_some(),
        GIF_MIME => {
            memmem::find(data, GIF_LOOP_EXTENSION).is_some()
                || memmem::find_iter(data, GIF_GRAPHIC_CONTROL).nth(1).is_some()
        }
        _ => false,
    }
}
