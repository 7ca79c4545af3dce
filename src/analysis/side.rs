//! Front/back classification by colour signature

use crate::analysis::card::RectifiedCard;
use crate::config::EdgeConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardSide {
    Front,
    Back,
}

impl fmt::Display for CardSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardSide::Front => f.write_str("front"),
            CardSide::Back => f.write_str("back"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SideClassification {
    pub side: CardSide,
    /// Fraction of interior pixels with a saturated blue hue
    pub blue_fraction: f32,
    pub yellow_fraction: f32,
}

/// True when the pixel carries a hue inside `[min, max]` degrees
pub(crate) fn hue_in(hue: f32, saturation: f32, value: f32, min: f32, max: f32, config: &EdgeConfig) -> bool {
    saturation >= config.hue_min_saturation
        && value >= config.hue_min_value
        && hue >= min
        && hue <= max
}

/// Backs are dominated by blue with almost no yellow
pub fn classify_side(card: &RectifiedCard, config: &EdgeConfig) -> SideClassification {
    let planes = card.planes();
    let interior = card.interior();
    let mut total = 0usize;
    let mut blue = 0usize;
    let mut yellow = 0usize;

    for y in 0..card.height() {
        for x in 0..card.width() {
            if !interior.get(x, y) {
                continue;
            }
            let i = planes.index(x, y);
            let (h, s, v) = (planes.hue[i], planes.saturation[i], planes.value[i]);
            total += 1;
            if hue_in(h, s, v, config.blue_hue_min, config.blue_hue_max, config) {
                blue += 1;
            } else if hue_in(h, s, v, config.yellow_hue_min, config.yellow_hue_max, config) {
                yellow += 1;
            }
        }
    }

    let (blue_fraction, yellow_fraction) = if total == 0 {
        (0.0, 0.0)
    } else {
        (blue as f32 / total as f32, yellow as f32 / total as f32)
    };
    let side = if blue_fraction > config.back_blue_fraction && yellow_fraction < config.back_max_yellow {
        CardSide::Back
    } else {
        CardSide::Front
    };

    SideClassification {
        side,
        blue_fraction,
        yellow_fraction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RectificationConfig;
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn card(image: RgbImage) -> RectifiedCard {
        RectifiedCard::new(image, &RectificationConfig::default()).unwrap()
    }

    #[test]
    fn test_blue_card_is_back() {
        let mut image = RgbImage::from_pixel(500, 700, Rgb([255, 215, 0]));
        draw_filled_rect_mut(&mut image, Rect::at(10, 10).of_size(480, 680), Rgb([30, 60, 200]));
        let result = classify_side(&card(image), &EdgeConfig::default());
        assert_eq!(result.side, CardSide::Back);
        assert!(result.blue_fraction > 0.9);
        assert!(result.yellow_fraction < 0.1);
    }

    #[test]
    fn test_yellow_bordered_front() {
        let mut image = RgbImage::from_pixel(500, 700, Rgb([255, 215, 0]));
        draw_filled_rect_mut(&mut image, Rect::at(40, 40).of_size(420, 620), Rgb([30, 60, 200]));
        let result = classify_side(&card(image), &EdgeConfig::default());
        // Blue still dominates but the border is too yellow for a back
        assert_eq!(result.side, CardSide::Front);
        assert!(result.yellow_fraction >= 0.12);
    }

    #[test]
    fn test_gray_card_is_front() {
        let image = RgbImage::from_pixel(500, 700, Rgb([128, 128, 128]));
        let result = classify_side(&card(image), &EdgeConfig::default());
        assert_eq!(result.side, CardSide::Front);
        assert_eq!(result.blue_fraction, 0.0);
    }
}
