//! Upstream and public comic shapes.

use serde::{Deserialize, Serialize};

/// Comic metadata as served by `https://xkcd.com/<id>/info.0.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct XkcdResponse {
    pub month: String,
    pub num: i32,
    pub link: String,
    pub year: String,
    pub news: String,
    pub safe_title: String,
    pub transcript: String,
    pub alt: String,
    pub img: String,
    pub title: String,
    pub day: String,
}

impl Default for XkcdResponse {
    fn default() -> Self {
        Self {
            month: String::new(),
            num: -1,
            link: String::new(),
            year: String::new(),
            news: String::new(),
            safe_title: String::new(),
            transcript: String::new(),
            alt: String::new(),
            img: String::new(),
            title: String::new(),
            day: String::new(),
        }
    }
}

/// Comic as exposed by this service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Xkcd {
    pub num: i32,
    pub img: String,
    pub title: String,
    pub month: String,
    pub year: String,
    pub transcript: String,
}

impl From<XkcdResponse> for Xkcd {
    fn from(response: XkcdResponse) -> Self {
        Self {
            num: response.num,
            img: response.img,
            title: response.title,
            month: response.month,
            year: response.year,
            transcript: response.transcript,
        }
    }
}
