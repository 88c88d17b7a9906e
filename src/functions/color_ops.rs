//! Color manipulation: lighten/darken, saturation, alpha, mixing.

use crate::error::LessError;
use crate::node::Node;
use crate::tree::color::{Color, Hsl};

use super::{expect_color, fraction_of, FunctionContext, FunctionRegistry};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.add("saturate", |_, args| adjust_hsl(args, "saturate", |h, amt| h.s += amt));
    registry.add("desaturate", |_, args| adjust_hsl(args, "desaturate", |h, amt| h.s -= amt));
    registry.add("lighten", |_, args| adjust_hsl(args, "lighten", |h, amt| h.l += amt));
    registry.add("darken", |_, args| adjust_hsl(args, "darken", |h, amt| h.l -= amt));
    registry.add("fadein", |_, args| adjust_hsl(args, "fadein", |h, amt| h.a += amt));
    registry.add("fadeout", |_, args| adjust_hsl(args, "fadeout", |h, amt| h.a -= amt));

    registry.add("fade", |_, args| {
        let color = expect_color(args, 0, "fade")?;
        let amount = amount_arg(args, "fade")?;
        Ok(Some(Node::Color(Color::new(color.rgb, amount.clamp(0.0, 1.0)))))
    });

    registry.add("spin", |_, args| {
        let color = expect_color(args, 0, "spin")?;
        let degrees = match args.get(1) {
            Some(Node::Dimension(d)) => d.value,
            _ => return Err(LessError::argument("spin expects a color and an angle")),
        };

        let mut hsl = color.to_hsl();
        hsl.h = (hsl.h + degrees).rem_euclid(360.0);
        Ok(Some(Node::Color(Color::from_hsla(hsl))))
    });

    registry.add("mix", mix);

    registry.add("tint", |fctx, args| {
        mix_with(fctx, args, Color::new([255.0, 255.0, 255.0], 1.0))
    });

    registry.add("shade", |fctx, args| {
        mix_with(fctx, args, Color::new([0.0, 0.0, 0.0], 1.0))
    });

    registry.add("greyscale", |_, args| {
        let color = expect_color(args, 0, "greyscale")?;
        let mut hsl = color.to_hsl();
        hsl.s = 0.0;
        Ok(Some(Node::Color(Color::from_hsla(hsl))))
    });

    registry.add("contrast", contrast);
}

fn amount_arg(args: &[Node], name: &str) -> Result<f64, LessError> {
    match args.get(1) {
        Some(node) => fraction_of(node, name),
        None => Err(LessError::argument(format!(
            "{name} expects a color and an amount"
        ))),
    }
}

fn adjust_hsl(
    args: &[Node],
    name: &str,
    apply: impl Fn(&mut Hsl, f64),
) -> Result<Option<Node>, LessError> {
    let color = expect_color(args, 0, name)?;
    let amount = amount_arg(args, name)?;

    let mut hsl = color.to_hsl();
    apply(&mut hsl, amount);
    hsl.s = hsl.s.clamp(0.0, 1.0);
    hsl.l = hsl.l.clamp(0.0, 1.0);
    hsl.a = hsl.a.clamp(0.0, 1.0);

    Ok(Some(Node::Color(Color::from_hsla(hsl))))
}

fn mix(_: &mut FunctionContext<'_, '_>, args: &[Node]) -> Result<Option<Node>, LessError> {
    let color1 = expect_color(args, 0, "mix")?;
    let color2 = expect_color(args, 1, "mix")?;

    let weight = match args.get(2) {
        Some(node) => fraction_of(node, "mix")?,
        None => 0.5,
    };

    Ok(Some(Node::Color(mix_colors(&color1, &color2, weight))))
}

fn mix_with(
    fctx: &mut FunctionContext<'_, '_>,
    args: &[Node],
    other: Color,
) -> Result<Option<Node>, LessError> {
    let color = expect_color(args, 0, fctx.name)?;
    let weight = match args.get(1) {
        Some(node) => fraction_of(node, fctx.name)?,
        None => 0.5,
    };

    Ok(Some(Node::Color(mix_colors(&other, &color, weight))))
}

/// The classic Sass/Less mix: weights corrected by the alpha difference.
fn mix_colors(color1: &Color, color2: &Color, weight: f64) -> Color {
    let w = weight * 2.0 - 1.0;
    let a = color1.alpha - color2.alpha;

    let w1 = if w * a == -1.0 {
        (w + 1.0) / 2.0
    } else {
        ((w + a) / (1.0 + w * a) + 1.0) / 2.0
    };
    let w2 = 1.0 - w1;

    let rgb = [
        color1.rgb[0] * w1 + color2.rgb[0] * w2,
        color1.rgb[1] * w1 + color2.rgb[1] * w2,
        color1.rgb[2] * w1 + color2.rgb[2] * w2,
    ];
    let alpha = color1.alpha * weight + color2.alpha * (1.0 - weight);

    Color::new(rgb, alpha)
}

/// Picks whichever of two candidate colors contrasts more with the first
/// argument.
fn contrast(_: &mut FunctionContext<'_, '_>, args: &[Node]) -> Result<Option<Node>, LessError> {
    // A non-color first argument passes through, so `contrast()` can be used
    // on variables that may hold keywords.
    let Some(color) = args.first().and_then(|n| n.to_color()) else {
        return Ok(None);
    };

    let dark = match args.get(1) {
        Some(n) => expect_color(std::slice::from_ref(n), 0, "contrast")?,
        None => Color::new([0.0, 0.0, 0.0], 1.0),
    };
    let light = match args.get(2) {
        Some(n) => expect_color(std::slice::from_ref(n), 0, "contrast")?,
        None => Color::new([255.0, 255.0, 255.0], 1.0),
    };

    let threshold = match args.get(3) {
        Some(n) => fraction_of(n, "contrast")?,
        None => 0.43,
    };

    // Swap if the caller passed them the wrong way round.
    let (dark, light) = if dark.luma() > light.luma() {
        (light, dark)
    } else {
        (dark, light)
    };

    if color.luma() < threshold {
        Ok(Some(Node::Color(light)))
    } else {
        Ok(Some(Node::Color(dark)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::GenCss;
    use crate::tree::dimension::Dimension;

    fn pct(v: f64) -> Node {
        Node::Dimension(Dimension::with_unit(v, "%").unwrap())
    }

    #[test]
    fn lighten_moves_toward_white() {
        let color = Node::Color(Color::from_hex("808080").unwrap());
        let result = adjust_hsl(&[color, pct(50.0)], "lighten", |h, amt| h.l += amt)
            .unwrap()
            .unwrap();
        assert_eq!(result.to_css_string(false).unwrap(), "#ffffff");
    }

    #[test]
    fn darken_clamps_at_black() {
        let color = Node::Color(Color::from_hex("202020").unwrap());
        let result = adjust_hsl(&[color, pct(90.0)], "darken", |h, amt| h.l -= amt)
            .unwrap()
            .unwrap();
        assert_eq!(result.to_css_string(false).unwrap(), "#000000");
    }

    #[test]
    fn even_mix_of_black_and_white() {
        let result = mix_colors(
            &Color::new([0.0, 0.0, 0.0], 1.0),
            &Color::new([255.0, 255.0, 255.0], 1.0),
            0.5,
        );
        assert_eq!(result.to_css(false), "#808080".to_string());
    }
}
