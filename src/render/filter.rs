//! Named, parameterized image transforms applied to the camera frame before overlays.
//!
//! Filters are described as a list of [`FilterOp`]s (the CSS filter-function vocabulary). Adjacent
//! color ops are fused into a single 3x4 color matrix so a preset costs one pass over the frame
//! plus one pass per blur.

use crate::foundation::error::{ReelError, ReelResult};
use crate::render::blur::blur_rgba8_premul_in_place;
use crate::render::surface::Surface;

const MAX_BLUR_PX: f32 = 32.0;
const MAX_BLUR_RADIUS: u32 = 64;

/// One filter function.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "kebab-case")]
pub enum FilterOp {
    Grayscale(f32),
    Sepia(f32),
    Saturate(f32),
    HueRotate(f32),
    Brightness(f32),
    Contrast(f32),
    Invert(f32),
    /// Gaussian standard deviation in pixels.
    Blur(f32),
}

/// A named filter selectable by the user.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FilterDescriptor {
    pub name: String,
    pub ops: Vec<FilterOp>,
}

/// Built-in preset names, in display order.
pub const PRESET_NAMES: [&str; 9] = [
    "none", "beauty", "vivid", "warm", "cool", "noir", "vintage", "dreamy", "invert",
];

impl FilterDescriptor {
    /// The pass-through filter.
    pub fn identity() -> Self {
        Self {
            name: "none".to_owned(),
            ops: Vec::new(),
        }
    }

    pub fn preset(name: &str) -> Option<Self> {
        let css = match name {
            "none" => "",
            "beauty" => "blur(1px) brightness(1.08) saturate(1.1) contrast(0.95)",
            "vivid" => "saturate(1.6) contrast(1.1)",
            "warm" => "sepia(0.3) saturate(1.3) hue-rotate(-10deg)",
            "cool" => "saturate(1.1) hue-rotate(20deg) brightness(1.05)",
            "noir" => "grayscale(1) contrast(1.4)",
            "vintage" => "sepia(0.6) contrast(0.9) brightness(1.1)",
            "dreamy" => "blur(2px) brightness(1.15) saturate(0.9)",
            "invert" => "invert(1)",
            _ => return None,
        };
        // Preset strings are static and known to parse.
        let ops = parse_filter_ops(css).ok()?;
        Some(Self {
            name: name.to_owned(),
            ops,
        })
    }

    /// Parse a CSS-style filter list such as `"grayscale(1) contrast(120%) blur(2px)"`.
    pub fn parse(name: impl Into<String>, css: &str) -> ReelResult<Self> {
        Ok(Self {
            name: name.into(),
            ops: parse_filter_ops(css)?,
        })
    }

    /// Resolve a preset name, falling back to parsing `value` as a filter list.
    pub fn from_name_or_css(value: &str) -> ReelResult<Self> {
        match Self::preset(value) {
            Some(p) => Ok(p),
            None => Self::parse("custom", value),
        }
    }

    pub fn is_identity(&self) -> bool {
        compile_stages(&self.ops).is_empty()
    }

    pub fn compile(&self) -> ReelResult<CompiledFilter> {
        for op in &self.ops {
            validate_op(*op)?;
        }
        Ok(CompiledFilter {
            stages: compile_stages(&self.ops),
            scratch: Vec::new(),
        })
    }
}

impl Default for FilterDescriptor {
    fn default() -> Self {
        Self::identity()
    }
}

/// Row-major 3x4 matrix over straight-alpha RGB in `[0, 1]`; column 3 is the offset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorMatrix(pub [[f32; 4]; 3]);

impl ColorMatrix {
    pub const IDENTITY: Self = Self([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
    ]);

    fn rgb(m: [[f32; 3]; 3]) -> Self {
        Self([
            [m[0][0], m[0][1], m[0][2], 0.0],
            [m[1][0], m[1][1], m[1][2], 0.0],
            [m[2][0], m[2][1], m[2][2], 0.0],
        ])
    }

    fn diagonal(scale: f32, offset: f32) -> Self {
        Self([
            [scale, 0.0, 0.0, offset],
            [0.0, scale, 0.0, offset],
            [0.0, 0.0, scale, offset],
        ])
    }

    /// Matrix for `op`, or `None` for non-color ops.
    pub fn for_op(op: FilterOp) -> Option<Self> {
        let m = match op {
            FilterOp::Grayscale(a) => {
                let s = 1.0 - a.clamp(0.0, 1.0);
                Self::rgb([
                    [0.2126 + 0.7874 * s, 0.7152 - 0.7152 * s, 0.0722 - 0.0722 * s],
                    [0.2126 - 0.2126 * s, 0.7152 + 0.2848 * s, 0.0722 - 0.0722 * s],
                    [0.2126 - 0.2126 * s, 0.7152 - 0.7152 * s, 0.0722 + 0.9278 * s],
                ])
            }
            FilterOp::Sepia(a) => {
                let s = 1.0 - a.clamp(0.0, 1.0);
                Self::rgb([
                    [0.393 + 0.607 * s, 0.769 - 0.769 * s, 0.189 - 0.189 * s],
                    [0.349 - 0.349 * s, 0.686 + 0.314 * s, 0.168 - 0.168 * s],
                    [0.272 - 0.272 * s, 0.534 - 0.534 * s, 0.131 + 0.869 * s],
                ])
            }
            FilterOp::Saturate(s) => Self::rgb([
                [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
                [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
                [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
            ]),
            FilterOp::HueRotate(deg) => {
                let (sin, cos) = deg.to_radians().sin_cos();
                Self::rgb([
                    [
                        0.213 + cos * 0.787 - sin * 0.213,
                        0.715 - cos * 0.715 - sin * 0.715,
                        0.072 - cos * 0.072 + sin * 0.928,
                    ],
                    [
                        0.213 - cos * 0.213 + sin * 0.143,
                        0.715 + cos * 0.285 + sin * 0.140,
                        0.072 - cos * 0.072 - sin * 0.283,
                    ],
                    [
                        0.213 - cos * 0.213 - sin * 0.787,
                        0.715 - cos * 0.715 + sin * 0.715,
                        0.072 + cos * 0.928 + sin * 0.072,
                    ],
                ])
            }
            FilterOp::Brightness(b) => Self::diagonal(b.max(0.0), 0.0),
            FilterOp::Contrast(c) => {
                let c = c.max(0.0);
                Self::diagonal(c, 0.5 - 0.5 * c)
            }
            FilterOp::Invert(a) => {
                let a = a.clamp(0.0, 1.0);
                Self::diagonal(1.0 - 2.0 * a, a)
            }
            FilterOp::Blur(_) => return None,
        };
        Some(m)
    }

    /// `self` applied first, then `next`.
    pub fn then(self, next: Self) -> Self {
        let a = self.0;
        let b = next.0;
        let mut out = [[0.0f32; 4]; 3];
        for (r, row) in out.iter_mut().enumerate() {
            for c in 0..3 {
                row[c] = (0..3).map(|k| b[r][k] * a[k][c]).sum();
            }
            row[3] = (0..3).map(|k| b[r][k] * a[k][3]).sum::<f32>() + b[r][3];
        }
        Self(out)
    }

    pub fn is_identity(&self) -> bool {
        self.0
            .iter()
            .flatten()
            .zip(Self::IDENTITY.0.iter().flatten())
            .all(|(a, b)| (a - b).abs() < 1e-6)
    }

    /// Apply to one premultiplied pixel.
    pub fn apply_premul(&self, px: [u8; 4]) -> [u8; 4] {
        let a = px[3];
        if a == 0 {
            return px;
        }
        let af = f32::from(a) / 255.0;
        let rgb = [
            f32::from(px[0]) / 255.0 / af,
            f32::from(px[1]) / 255.0 / af,
            f32::from(px[2]) / 255.0 / af,
        ];
        let mut out = [0u8; 4];
        for (i, row) in self.0.iter().enumerate() {
            let v = row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2] + row[3];
            out[i] = ((v.clamp(0.0, 1.0) * af * 255.0).round() as i32).clamp(0, i32::from(a)) as u8;
        }
        out[3] = a;
        out
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum FilterStage {
    Color(ColorMatrix),
    Blur { radius: u32, sigma: f32 },
}

fn compile_stages(ops: &[FilterOp]) -> Vec<FilterStage> {
    let mut stages = Vec::<FilterStage>::new();
    let mut pending = ColorMatrix::IDENTITY;

    for &op in ops {
        match op {
            FilterOp::Blur(px) => {
                let sigma = px.clamp(0.0, MAX_BLUR_PX);
                if sigma <= 0.0 || !sigma.is_finite() {
                    continue;
                }
                if !pending.is_identity() {
                    stages.push(FilterStage::Color(pending));
                    pending = ColorMatrix::IDENTITY;
                }
                let radius = ((sigma * 2.0).ceil() as u32).clamp(1, MAX_BLUR_RADIUS);
                stages.push(FilterStage::Blur { radius, sigma });
            }
            other => {
                if let Some(m) = ColorMatrix::for_op(other) {
                    pending = pending.then(m);
                }
            }
        }
    }
    if !pending.is_identity() {
        stages.push(FilterStage::Color(pending));
    }
    stages
}

fn validate_op(op: FilterOp) -> ReelResult<()> {
    let (name, v) = match op {
        FilterOp::Grayscale(v) => ("grayscale", v),
        FilterOp::Sepia(v) => ("sepia", v),
        FilterOp::Saturate(v) => ("saturate", v),
        FilterOp::HueRotate(v) => ("hue-rotate", v),
        FilterOp::Brightness(v) => ("brightness", v),
        FilterOp::Contrast(v) => ("contrast", v),
        FilterOp::Invert(v) => ("invert", v),
        FilterOp::Blur(v) => ("blur", v),
    };
    if !v.is_finite() {
        return Err(ReelError::validation(format!("{name} amount must be finite")));
    }
    match op {
        FilterOp::HueRotate(_) => Ok(()),
        FilterOp::Blur(px) if px > MAX_BLUR_PX => Err(ReelError::validation(format!(
            "blur must be <= {MAX_BLUR_PX}px, got {px}px"
        ))),
        _ if v < 0.0 => Err(ReelError::validation(format!(
            "{name} amount must be >= 0, got {v}"
        ))),
        _ => Ok(()),
    }
}

/// Filter ready to run once per tick.
#[derive(Clone, Debug)]
pub struct CompiledFilter {
    stages: Vec<FilterStage>,
    scratch: Vec<u8>,
}

impl CompiledFilter {
    pub fn is_identity(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn apply(&mut self, surface: &mut Surface) -> ReelResult<()> {
        let canvas = surface.canvas();
        for stage in &self.stages {
            match *stage {
                FilterStage::Color(m) => {
                    for px in surface.data_mut().chunks_exact_mut(4) {
                        let out = m.apply_premul([px[0], px[1], px[2], px[3]]);
                        px.copy_from_slice(&out);
                    }
                }
                FilterStage::Blur { radius, sigma } => blur_rgba8_premul_in_place(
                    surface.data_mut(),
                    canvas.width,
                    canvas.height,
                    radius,
                    sigma,
                    &mut self.scratch,
                )?,
            }
        }
        Ok(())
    }
}

fn parse_filter_ops(css: &str) -> ReelResult<Vec<FilterOp>> {
    let mut ops = Vec::new();
    let mut rest = css.trim();
    while !rest.is_empty() {
        let open = rest
            .find('(')
            .ok_or_else(|| ReelError::validation(format!("expected '(' in filter '{rest}'")))?;
        let close = rest[open..]
            .find(')')
            .map(|i| i + open)
            .ok_or_else(|| ReelError::validation(format!("unclosed '(' in filter '{rest}'")))?;
        let name = rest[..open].trim().to_ascii_lowercase();
        let arg = rest[open + 1..close].trim();
        let op = parse_one(&name, arg)?;
        validate_op(op)?;
        ops.push(op);
        rest = rest[close + 1..].trim_start();
    }
    Ok(ops)
}

fn parse_one(name: &str, arg: &str) -> ReelResult<FilterOp> {
    let op = match name {
        "grayscale" => FilterOp::Grayscale(parse_amount(name, arg)?),
        "sepia" => FilterOp::Sepia(parse_amount(name, arg)?),
        "saturate" => FilterOp::Saturate(parse_amount(name, arg)?),
        "brightness" => FilterOp::Brightness(parse_amount(name, arg)?),
        "contrast" => FilterOp::Contrast(parse_amount(name, arg)?),
        "invert" => FilterOp::Invert(parse_amount(name, arg)?),
        "hue-rotate" => FilterOp::HueRotate(parse_angle_deg(arg)?),
        "blur" => {
            let px = arg.strip_suffix("px").unwrap_or(arg).trim();
            FilterOp::Blur(parse_number(name, px)?)
        }
        _ => {
            return Err(ReelError::validation(format!(
                "unknown filter function '{name}'"
            )));
        }
    };
    Ok(op)
}

fn parse_number(name: &str, s: &str) -> ReelResult<f32> {
    s.parse::<f32>()
        .map_err(|_| ReelError::validation(format!("{name}: invalid number '{s}'")))
}

fn parse_amount(name: &str, arg: &str) -> ReelResult<f32> {
    match arg.strip_suffix('%') {
        Some(pct) => Ok(parse_number(name, pct.trim())? / 100.0),
        None => parse_number(name, arg),
    }
}

fn parse_angle_deg(arg: &str) -> ReelResult<f32> {
    if let Some(v) = arg.strip_suffix("deg") {
        return parse_number("hue-rotate", v.trim());
    }
    if let Some(v) = arg.strip_suffix("turn") {
        return Ok(parse_number("hue-rotate", v.trim())? * 360.0);
    }
    if let Some(v) = arg.strip_suffix("rad") {
        return Ok(parse_number("hue-rotate", v.trim())?.to_degrees());
    }
    parse_number("hue-rotate", arg)
}

#[cfg(test)]
#[path = "../../tests/unit/render/filter.rs"]
mod tests;
