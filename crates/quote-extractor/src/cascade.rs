//! The four-step price-extraction cascade run against a page's HTML
//! (spec.md §4.3 "Extraction cascade"). Pure functions over already-fetched
//! HTML so they can be unit-tested without a browser.

use quote_types::ExtractionMethod;
use rust_decimal::Decimal;
use scraper::{Html, Selector};

/// CSS selectors tried in order for the DOM step, joined exactly as
/// spec.md §4.3 lists them.
const DOM_SELECTORS: &[&str] = &[
	".price",
	".product-price",
	"[itemprop=price]",
	"[data-price]",
	".current-price",
	".sale-price",
];

fn regex_brl() -> regex::Regex {
	regex::Regex::new(r"R\$\s*\d{1,3}(?:\.\d{3})*,\d{2}").expect("static BRL regex is valid")
}

/// Runs the full cascade, returning the first price found along with the
/// method that found it.
pub fn extract_price(html: &str) -> Option<(Decimal, ExtractionMethod)> {
	extract_jsonld(html)
		.map(|p| (p, ExtractionMethod::JsonLd))
		.or_else(|| extract_meta(html).map(|p| (p, ExtractionMethod::Meta)))
		.or_else(|| extract_dom(html).map(|p| (p, ExtractionMethod::Dom)))
		.or_else(|| extract_regex(html).map(|p| (p, ExtractionMethod::Regex)))
}

/// Step 1: `<script type="application/ld+json">` blocks, accepting
/// `Product.offers.price` or the first `Offer.price` encountered.
fn extract_jsonld(html: &str) -> Option<Decimal> {
	let document = Html::parse_document(html);
	let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;

	for script in document.select(&selector) {
		let text: String = script.text().collect();
		let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
			continue;
		};
		if let Some(price) = find_jsonld_price(&value) {
			return Some(price);
		}
	}
	None
}

fn find_jsonld_price(value: &serde_json::Value) -> Option<Decimal> {
	match value {
		serde_json::Value::Array(items) => items.iter().find_map(find_jsonld_price),
		serde_json::Value::Object(_) => {
			let type_name = value.get("@type").and_then(|t| t.as_str()).unwrap_or_default();
			if type_name == "Product" {
				if let Some(price) = value.get("offers").and_then(find_jsonld_price) {
					return Some(price);
				}
			}
			if type_name == "Offer" || value.get("price").is_some() {
				if let Some(price) = value.get("price") {
					return price_from_json_value(price);
				}
			}
			// `offers` may itself be an array of Offer objects.
			if let Some(offers) = value.get("offers") {
				if let Some(price) = find_jsonld_price(offers) {
					return Some(price);
				}
			}
			None
		}
		_ => None,
	}
}

fn price_from_json_value(value: &serde_json::Value) -> Option<Decimal> {
	if let Some(n) = value.as_f64() {
		return Decimal::from_f64_retain(n);
	}
	value.as_str().and_then(|s| s.parse().ok())
}

/// Step 2: `<meta property="og:price:amount">` or
/// `<meta property="product:price:amount">`.
fn extract_meta(html: &str) -> Option<Decimal> {
	let document = Html::parse_document(html);
	for property in ["og:price:amount", "product:price:amount"] {
		let selector = Selector::parse(&format!(r#"meta[property="{property}"]"#)).ok()?;
		if let Some(el) = document.select(&selector).next() {
			if let Some(content) = el.value().attr("content") {
				if let Ok(amount) = content.parse::<Decimal>() {
					return Some(amount);
				}
			}
		}
	}
	None
}

/// Step 3: the fixed DOM selector set, reading element text or, for
/// attribute-carried prices (`[data-price]`, `[itemprop=price]` using
/// `content`), the attribute value.
fn extract_dom(html: &str) -> Option<Decimal> {
	let document = Html::parse_document(html);
	for raw_selector in DOM_SELECTORS {
		let Ok(selector) = Selector::parse(raw_selector) else {
			continue;
		};
		for el in document.select(&selector) {
			if let Some(attr) = el.value().attr("content").or_else(|| el.value().attr("data-price")) {
				if let Ok(money) = quote_types::Money::parse_brl(attr) {
					return Some(money.amount());
				}
			}
			let text: String = el.text().collect();
			if let Ok(money) = quote_types::Money::parse_brl(&text) {
				return Some(money.amount());
			}
		}
	}
	None
}

/// Step 4: regex scan of the full page HTML for Brazilian currency
/// patterns, picking the first match.
fn extract_regex(html: &str) -> Option<Decimal> {
	let re = regex_brl();
	let matched = re.find(html)?;
	quote_types::Money::parse_brl(matched.as_str()).ok().map(|m| m.amount())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn jsonld_product_offers_price_wins_over_later_steps() {
		let html = r#"
			<html><head>
			<script type="application/ld+json">
			{"@type": "Product", "offers": {"@type": "Offer", "price": "1234.56"}}
			</script>
			<meta property="og:price:amount" content="999.00">
			</head><body></body></html>
		"#;
		let (price, method) = extract_price(html).unwrap();
		assert_eq!(method, ExtractionMethod::JsonLd);
		assert_eq!(price, Decimal::new(123456, 2));
	}

	#[test]
	fn meta_tag_used_when_no_jsonld() {
		let html = r#"<html><head><meta property="og:price:amount" content="250.90"></head></html>"#;
		let (price, method) = extract_price(html).unwrap();
		assert_eq!(method, ExtractionMethod::Meta);
		assert_eq!(price, Decimal::new(25090, 2));
	}

	#[test]
	fn dom_selector_used_when_no_jsonld_or_meta() {
		let html = r#"<html><body><span class="price">R$ 1.099,90</span></body></html>"#;
		let (price, method) = extract_price(html).unwrap();
		assert_eq!(method, ExtractionMethod::Dom);
		assert_eq!(price, Decimal::new(109990, 2));
	}

	#[test]
	fn regex_fallback_scans_raw_html() {
		let html = r#"<html><body><div>Por apenas R$ 499,00 a vista</div></body></html>"#;
		let (price, method) = extract_price(html).unwrap();
		assert_eq!(method, ExtractionMethod::Regex);
		assert_eq!(price, Decimal::new(49900, 2));
	}

	#[test]
	fn returns_none_when_no_price_anywhere() {
		let html = r#"<html><body><p>Produto indisponível</p></body></html>"#;
		assert!(extract_price(html).is_none());
	}
}
