//! Color constructors and channel accessors.

use crate::error::LessError;
use crate::node::Node;
use crate::tree::color::{Color, Hsl};
use crate::tree::dimension::Dimension;
use crate::tree::unit::Unit;

use super::{expect_color, expect_dimension, fraction_of, FunctionContext, FunctionRegistry};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.add("rgb", |_, args| rgba_impl(args, false));
    registry.add("rgba", |_, args| rgba_impl(args, true));
    registry.add("hsl", |_, args| hsla_impl(args, false));
    registry.add("hsla", |_, args| hsla_impl(args, true));
    registry.add("argb", argb);

    registry.add("red", |_, args| channel(args, "red", |c| c.rgb[0]));
    registry.add("green", |_, args| channel(args, "green", |c| c.rgb[1]));
    registry.add("blue", |_, args| channel(args, "blue", |c| c.rgb[2]));

    registry.add("alpha", |_, args| {
        let c = expect_color(args, 0, "alpha")?;
        Ok(Some(Node::Dimension(Dimension::number(c.alpha)?)))
    });

    registry.add("hue", |_, args| {
        let c = expect_color(args, 0, "hue")?;
        Ok(Some(Node::Dimension(Dimension::number(c.to_hsl().h)?)))
    });

    registry.add("saturation", |_, args| hsl_percent(args, "saturation", |h| h.s));
    registry.add("lightness", |_, args| hsl_percent(args, "lightness", |h| h.l));

    registry.add("luma", |_, args| {
        let c = expect_color(args, 0, "luma")?;
        Ok(Some(Node::Dimension(Dimension::new(
            c.luma() * c.alpha * 100.0,
            Unit::single("%"),
        )?)))
    });
}

fn channel_value(node: &Node, function: &str) -> Result<f64, LessError> {
    match node {
        Node::Dimension(d) => {
            if d.unit.numerator.first().map(String::as_str) == Some("%") {
                Ok(d.value * 255.0 / 100.0)
            } else {
                Ok(d.value)
            }
        }
        other => Err(LessError::argument(format!(
            "{function} expects numeric channels, found {}",
            other.kind_name()
        ))),
    }
}

fn rgba_impl(args: &[Node], with_alpha: bool) -> Result<Option<Node>, LessError> {
    let name = if with_alpha { "rgba" } else { "rgb" };

    // rgba(color, alpha) adjusts an existing color.
    if with_alpha && args.len() == 2 {
        if let Some(color) = args[0].to_color() {
            let alpha = fraction_of(&args[1], name)?;
            return Ok(Some(Node::Color(Color::new(color.rgb, alpha))));
        }
    }

    let r = channel_value(args.first().ok_or_else(|| missing(name))?, name)?;
    let g = channel_value(args.get(1).ok_or_else(|| missing(name))?, name)?;
    let b = channel_value(args.get(2).ok_or_else(|| missing(name))?, name)?;

    let alpha = if with_alpha {
        fraction_of(args.get(3).ok_or_else(|| missing(name))?, name)?
    } else {
        1.0
    };

    Ok(Some(Node::Color(Color::new([r, g, b], alpha))))
}

fn hsla_impl(args: &[Node], with_alpha: bool) -> Result<Option<Node>, LessError> {
    let name = if with_alpha { "hsla" } else { "hsl" };

    let h = expect_dimension(args, 0, name)?.value;
    let s = fraction_of(args.get(1).ok_or_else(|| missing(name))?, name)?;
    let l = fraction_of(args.get(2).ok_or_else(|| missing(name))?, name)?;

    let a = if with_alpha {
        fraction_of(args.get(3).ok_or_else(|| missing(name))?, name)?
    } else {
        1.0
    };

    Ok(Some(Node::Color(Color::from_hsla(Hsl { h, s, l, a }))))
}

/// `argb(color)`: the `#AARRGGBB` form used by legacy IE filters.
fn argb(_: &mut FunctionContext<'_, '_>, args: &[Node]) -> Result<Option<Node>, LessError> {
    let c = expect_color(args, 0, "argb")?;

    let a = (c.alpha * 255.0).round().clamp(0.0, 255.0) as u8;
    let r = c.rgb[0].round().clamp(0.0, 255.0) as u8;
    let g = c.rgb[1].round().clamp(0.0, 255.0) as u8;
    let b = c.rgb[2].round().clamp(0.0, 255.0) as u8;

    Ok(Some(Node::Anonymous(crate::tree::atoms::Anonymous::new(
        format!("#{a:02x}{r:02x}{g:02x}{b:02x}"),
    ))))
}

fn channel(
    args: &[Node],
    name: &str,
    get: impl Fn(&Color) -> f64,
) -> Result<Option<Node>, LessError> {
    let c = expect_color(args, 0, name)?;
    Ok(Some(Node::Dimension(Dimension::number(get(&c))?)))
}

fn hsl_percent(
    args: &[Node],
    name: &str,
    get: impl Fn(&Hsl) -> f64,
) -> Result<Option<Node>, LessError> {
    let c = expect_color(args, 0, name)?;
    Ok(Some(Node::Dimension(Dimension::new(
        get(&c.to_hsl()) * 100.0,
        Unit::single("%"),
    )?)))
}

fn missing(name: &str) -> LessError {
    LessError::argument(format!("not enough arguments for {name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::GenCss;

    fn num(v: f64) -> Node {
        Node::Dimension(Dimension::number(v).unwrap())
    }

    fn pct(v: f64) -> Node {
        Node::Dimension(Dimension::with_unit(v, "%").unwrap())
    }

    #[test]
    fn rgb_with_percent_channels() {
        let result = rgba_impl(&[pct(100.0), num(0.0), num(0.0)], false)
            .unwrap()
            .unwrap();
        assert_eq!(result.to_css_string(false).unwrap(), "#ff0000");
    }

    #[test]
    fn hsl_round_trips_red() {
        let result = hsla_impl(&[num(0.0), pct(100.0), pct(50.0)], false)
            .unwrap()
            .unwrap();
        assert_eq!(result.to_css_string(false).unwrap(), "#ff0000");
    }

    #[test]
    fn rgba_from_color_and_alpha() {
        let red = Node::Color(Color::from_keyword("red").unwrap());
        let result = rgba_impl(&[red, num(0.5)], true).unwrap().unwrap();
        assert_eq!(result.to_css_string(false).unwrap(), "rgba(255, 0, 0, 0.5)");
    }
}
