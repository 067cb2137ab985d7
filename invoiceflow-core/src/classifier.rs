//! Product classification backing the expression functions
//! `get_standard_name` / `get_tax_rate` / `get_tax_category` /
//! `get_product_info`.
//!
//! The default implementation is a configured keyword table. A real external
//! classification service can be dropped in behind [`ProductClassifier`]
//! without touching any rule text.

use serde::{Deserialize, Serialize};

/// Everything the classifier knows about one product description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub standard_name: String,
    pub tax_rate: f64,
    pub tax_category: String,
    pub category_code: String,
}

/// Classification source for rule expressions.
///
/// Implementations must be infallible from the caller's point of view:
/// absorb internal failures (network, parsing) and answer with the
/// documented defaults instead of raising. Rule evaluation treats these
/// answers as plain values.
pub trait ProductClassifier: Send + Sync {
    fn product_info(&self, description: &str) -> ProductInfo;

    fn standard_name(&self, description: &str) -> String {
        self.product_info(description).standard_name
    }

    fn tax_rate(&self, description: &str) -> f64 {
        self.product_info(description).tax_rate
    }

    fn tax_category(&self, description: &str) -> String {
        self.product_info(description).tax_category
    }
}

/// One configured keyword mapping. First matching entry wins, so order the
/// configuration from specific to general.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordEntry {
    pub keyword: String,
    pub standard_name: String,
    pub tax_rate: f64,
    pub tax_category: String,
    pub category_code: String,
}

/// Fallback answers for descriptions no keyword matches. The standard name
/// defaults to echoing the input description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierDefaults {
    #[serde(default = "default_tax_rate")]
    pub tax_rate: f64,
    #[serde(default = "default_tax_category")]
    pub tax_category: String,
    #[serde(default = "default_category_code")]
    pub category_code: String,
}

fn default_tax_rate() -> f64 {
    0.06
}

fn default_tax_category() -> String {
    "VAT_GENERAL".to_string()
}

fn default_category_code() -> String {
    "OTHER".to_string()
}

impl Default for ClassifierDefaults {
    fn default() -> Self {
        Self {
            tax_rate: default_tax_rate(),
            tax_category: default_tax_category(),
            category_code: default_category_code(),
        }
    }
}

/// Keyword-table classifier. Matching is case-insensitive substring search
/// over the description.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    entries: Vec<KeywordEntry>,
    defaults: ClassifierDefaults,
}

impl KeywordClassifier {
    pub fn new(entries: Vec<KeywordEntry>, defaults: ClassifierDefaults) -> Self {
        Self { entries, defaults }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(
            vec![
                KeywordEntry {
                    keyword: "hotel".to_string(),
                    standard_name: "Accommodation".to_string(),
                    tax_rate: 0.13,
                    tax_category: "VAT_SPECIAL".to_string(),
                    category_code: "ACCOMMODATION".to_string(),
                },
                KeywordEntry {
                    keyword: "meal".to_string(),
                    standard_name: "Catering".to_string(),
                    tax_rate: 0.06,
                    tax_category: "VAT_GENERAL".to_string(),
                    category_code: "CATERING".to_string(),
                },
                KeywordEntry {
                    keyword: "restaurant".to_string(),
                    standard_name: "Catering".to_string(),
                    tax_rate: 0.06,
                    tax_category: "VAT_GENERAL".to_string(),
                    category_code: "CATERING".to_string(),
                },
                KeywordEntry {
                    keyword: "parking".to_string(),
                    standard_name: "Parking".to_string(),
                    tax_rate: 0.09,
                    tax_category: "REAL_ESTATE_RENTAL".to_string(),
                    category_code: "PARKING".to_string(),
                },
            ],
            ClassifierDefaults::default(),
        )
    }
}

impl ProductClassifier for KeywordClassifier {
    fn product_info(&self, description: &str) -> ProductInfo {
        let haystack = description.to_lowercase();
        for entry in &self.entries {
            if haystack.contains(&entry.keyword.to_lowercase()) {
                return ProductInfo {
                    standard_name: entry.standard_name.clone(),
                    tax_rate: entry.tax_rate,
                    tax_category: entry.tax_category.clone(),
                    category_code: entry.category_code.clone(),
                };
            }
        }
        ProductInfo {
            standard_name: description.to_string(),
            tax_rate: self.defaults.tax_rate,
            tax_category: self.defaults.tax_category.clone(),
            category_code: self.defaults.category_code.clone(),
        }
    }
}
