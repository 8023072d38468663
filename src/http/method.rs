use strum::{Display, EnumString};

#[derive(EnumString, Display, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Method {
    #[strum(serialize = "GET")]
    GET,
    #[strum(serialize = "HEAD")]
    HEAD,
    #[strum(serialize = "POST")]
    POST,
    #[strum(serialize = "PUT")]
    PUT,
    #[strum(serialize = "PATCH")]
    PATCH,
    #[strum(serialize = "DELETE")]
    DELETE,
    #[strum(serialize = "OPTIONS")]
    OPTIONS,
    #[strum(serialize = "TRACE")]
    TRACE,
    #[strum(serialize = "CONNECT")]
    CONNECT,
}

impl Method {
    /// Methods whose payload is handed to a body decoder.
    pub fn admits_body(&self) -> bool {
        matches!(self, Method::POST | Method::PUT | Method::PATCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parses_known_methods() {
        assert_eq!(Method::from_str("GET").unwrap(), Method::GET);
        assert_eq!(Method::from_str("PATCH").unwrap(), Method::PATCH);
        assert!(Method::from_str("get").is_err());
        assert_eq!(Method::POST.to_string(), "POST");
    }

    #[test]
    fn only_submission_methods_admit_body() {
        assert!(Method::POST.admits_body());
        assert!(Method::PUT.admits_body());
        assert!(!Method::GET.admits_body());
        assert!(!Method::DELETE.admits_body());
    }
}
