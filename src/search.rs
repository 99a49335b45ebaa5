use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One product row of a search-results page. Values are passed through as
/// text; empty when the API left them out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub title: String,
    pub price: String,
    pub rating: String,
    pub reviews_count: String,
    pub url: String,
    pub image: String,
    pub scraped_at: String,
}

pub fn build_search_url(query: &str, page: u32) -> String {
    format!(
        "https://www.amazon.com/s?k={}&page={}",
        urlencoding::encode(query),
        page
    )
}

fn text_of(product: &Value, key: &str) -> String {
    match product.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    }
}

/// Maps `results[0].content.products[]` of one page. `None` when the page
/// has no usable `results`/`content`.
pub fn parse_search_page(payload: &Value, scraped_at: &str) -> Option<Vec<SearchResultItem>> {
    let content = payload
        .get("results")?
        .as_array()?
        .first()?
        .get("content")?
        .as_object()?;

    let items = content
        .get("products")
        .and_then(Value::as_array)
        .map(|products| {
            products
                .iter()
                .filter(|p| p.is_object())
                .map(|p| SearchResultItem {
                    title: text_of(p, "title"),
                    price: text_of(p, "price"),
                    rating: text_of(p, "rating"),
                    reviews_count: text_of(p, "reviews_count"),
                    url: text_of(p, "url"),
                    image: text_of(p, "image"),
                    scraped_at: scraped_at.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();
    Some(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_url_encodes_query() {
        assert_eq!(
            build_search_url("wireless headphones", 2),
            "https://www.amazon.com/s?k=wireless%20headphones&page=2"
        );
    }

    #[test]
    fn parses_products() {
        let payload = json!({
            "results": [{
                "content": {
                    "products": [
                        { "title": "A", "price": 19.99, "rating": 4.5, "url": "/dp/B000000001" },
                        "garbage",
                        { "title": "B", "reviews_count": 12, "image": "https://img/b.jpg" }
                    ]
                }
            }]
        });
        let items = parse_search_page(&payload, "now").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "A");
        assert_eq!(items[0].price, "19.99");
        assert_eq!(items[0].rating, "4.5");
        assert_eq!(items[0].reviews_count, "");
        assert_eq!(items[1].reviews_count, "12");
        assert_eq!(items[1].scraped_at, "now");
    }

    #[test]
    fn page_without_content_is_skipped() {
        assert!(parse_search_page(&json!({ "results": [{}] }), "now").is_none());
        assert!(parse_search_page(&json!({}), "now").is_none());
        assert_eq!(
            parse_search_page(&json!({ "results": [{ "content": {} }] }), "now"),
            Some(vec![])
        );
    }
}
