//! Shelf packing of sprite images into one sheet.

use image::{imageops, RgbaImage};

/// A decoded sprite image.
#[derive(Debug, Clone)]
pub struct NamedImage {
    pub name: String,
    pub image: RgbaImage,
}

/// Where one sprite sits on the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A composed sheet plus placements, in input order.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub image: RgbaImage,
    pub placements: Vec<(String, Placement)>,
}

/// Row-based packer: tallest sprites first, left to right, wrapping at a
/// power-of-two sheet width.
#[derive(Debug, Clone, Copy)]
pub struct SheetPacker {
    pub padding: u32,
}

impl SheetPacker {
    pub fn new(padding: u32) -> Self {
        Self { padding }
    }

    fn sheet_width(&self, sprites: &[NamedImage]) -> u32 {
        let widest = sprites.iter().map(|s| s.image.width()).max().unwrap_or(1);
        let area: u64 = sprites
            .iter()
            .map(|s| {
                u64::from(s.image.width() + self.padding) * u64::from(s.image.height() + self.padding)
            })
            .sum();
        let side = (area as f64).sqrt().ceil() as u32;
        widest.max(side).max(1).next_power_of_two()
    }

    pub fn pack(&self, sprites: &[NamedImage]) -> Sheet {
        if sprites.is_empty() {
            return Sheet {
                image: RgbaImage::new(0, 0),
                placements: Vec::new(),
            };
        }

        // Tallest first; ties keep declaration order
        let mut order: Vec<usize> = (0..sprites.len()).collect();
        order.sort_by(|&a, &b| {
            sprites[b]
                .image
                .height()
                .cmp(&sprites[a].image.height())
                .then_with(|| a.cmp(&b))
        });

        let width = self.sheet_width(sprites);
        let mut origins = vec![(0u32, 0u32); sprites.len()];
        let (mut x, mut y, mut row_height) = (0u32, 0u32, 0u32);
        for &index in &order {
            let (w, h) = sprites[index].image.dimensions();
            if x + w > width && x > 0 {
                y += row_height + self.padding;
                x = 0;
                row_height = 0;
            }
            origins[index] = (x, y);
            row_height = row_height.max(h);
            x += w + self.padding;
        }
        let height = y + row_height;

        let mut image = RgbaImage::new(width, height);
        let mut placements = Vec::with_capacity(sprites.len());
        for (sprite, &(x, y)) in sprites.iter().zip(&origins) {
            imageops::replace(&mut image, &sprite.image, i64::from(x), i64::from(y));
            placements.push((
                sprite.name.clone(),
                Placement {
                    x,
                    y,
                    width: sprite.image.width(),
                    height: sprite.image.height(),
                },
            ));
        }

        Sheet { image, placements }
    }
}
