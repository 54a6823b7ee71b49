use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::types::Record;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Unrecognized address format: {0}")]
    BadAddress(String),
}

static RE_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<street>[^,]+),\s*(?P<city>[^,]+),\s*(?P<state>[A-Z]{2})\s+(?P<zip>\d{5})(?:-\d{4})?$")
        .expect("invalid regex: address")
});
static RE_GALLERY_CLEAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9 _-]").expect("invalid regex: gallery clean"));

/// One scraped listing card, with its one-line address already split into
/// identity components.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub price: String,
    pub beds: String,
    pub baths: String,
    pub square_feet: String,
    pub lot_size: String,
    pub url: String,
    pub image_url: String,
}

pub const LISTING_COLUMNS: &[&str] = &[
    "Street",
    "City",
    "State",
    "ZIP Code",
    "Price",
    "Beds",
    "Baths",
    "Square Feet",
    "Lot Size",
    "URL",
    "Image URL",
];

impl Listing {
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.set("Street", self.street.as_str());
        record.set("City", self.city.as_str());
        record.set("State", self.state.as_str());
        record.set("ZIP Code", self.zip.as_str());
        record.set("Price", self.price.as_str());
        record.set("Beds", self.beds.as_str());
        record.set("Baths", self.baths.as_str());
        record.set("Square Feet", self.square_feet.as_str());
        record.set("Lot Size", self.lot_size.as_str());
        record.set("URL", self.url.as_str());
        record.set("Image URL", self.image_url.as_str());
        record
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddressParts {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// Splits a one-line listing address, e.g.
/// `"123 Oak St, Metairie, LA 70001"`, into its identity components.
pub fn split_address(text: &str) -> Result<AddressParts, ParseError> {
    let caps = RE_ADDRESS
        .captures(text.trim())
        .ok_or_else(|| ParseError::BadAddress(text.to_string()))?;
    Ok(AddressParts {
        street: caps["street"].trim().to_string(),
        city: caps["city"].trim().to_string(),
        state: caps["state"].to_string(),
        zip: caps["zip"].to_string(),
    })
}

/// Directory name the gallery viewer expects for a property's photos:
/// `"{zip}_{street}"` with the street reduced to alphanumerics, spaces,
/// underscores and hyphens, trailing whitespace stripped.
pub fn gallery_dir_name(zip: &str, street: &str) -> String {
    let cleaned = RE_GALLERY_CLEAN.replace_all(street, "");
    format!("{}_{}", zip.trim(), cleaned.trim_end())
}

/// Extracts every listing card on a search-results page. Cards with missing
/// or unrecognizable fields are skipped with a warning; one broken card never
/// fails the page.
pub fn parse_listing_cards(html: &str, site_root: &str) -> Vec<Listing> {
    let document = Html::parse_document(html);
    let card_selector = Selector::parse("div.MapHomeCardReact").unwrap();

    let mut listings = Vec::new();
    for card in document.select(&card_selector) {
        match parse_card(card, site_root) {
            Ok(listing) => listings.push(listing),
            Err(e) => log::warn!("Skipping listing card: {}", e),
        }
    }
    listings
}

fn parse_card(card: ElementRef, site_root: &str) -> Result<Listing, ParseError> {
    let address_text = select_text(card, "div.bp-Homecard__Address")
        .ok_or_else(|| ParseError::MissingField("address".to_string()))?;
    let parts = split_address(&address_text)?;

    let price = select_text(card, "span.bp-Homecard__Price--value")
        .ok_or_else(|| ParseError::MissingField("price".to_string()))?;
    let beds = select_text(card, "span.bp-Homecard__Stats--beds")
        .ok_or_else(|| ParseError::MissingField("beds".to_string()))?;
    let baths = select_text(card, "span.bp-Homecard__Stats--baths")
        .ok_or_else(|| ParseError::MissingField("baths".to_string()))?;
    let square_feet = select_text(card, "span.bp-Homecard__Stats--sqft")
        .ok_or_else(|| ParseError::MissingField("sqft".to_string()))?;

    let lot_size = select_text(card, "div.KeyFactsExtension span.KeyFacts-item")
        .unwrap_or_else(|| "N/A".to_string());

    let href = select_attr(card, "a.bp-Homecard", "href")
        .ok_or_else(|| ParseError::MissingField("detail url".to_string()))?;
    let url = if href.starts_with("http") {
        href
    } else {
        format!("{site_root}{href}")
    };

    let image_url = select_attr(card, "img.bp-Homecard__Photo--image", "src")
        .map(|src| {
            if src.starts_with("http") {
                src
            } else {
                format!("https:{src}")
            }
        })
        .unwrap_or_default();

    Ok(Listing {
        street: parts.street,
        city: parts.city,
        state: parts.state,
        zip: parts.zip,
        price,
        beds,
        baths,
        square_feet,
        lot_size,
        url,
        image_url,
    })
}

fn select_one<'a>(card: ElementRef<'a>, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).expect("invalid selector");
    card.select(&selector).next()
}

fn select_text(card: ElementRef, selector: &str) -> Option<String> {
    select_one(card, selector).map(|el| normalize_whitespace(&el.text().collect::<String>()))
}

fn select_attr(card: ElementRef, selector: &str, attr: &str) -> Option<String> {
    select_one(card, selector).and_then(|el| el.value().attr(attr).map(str::to_string))
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
