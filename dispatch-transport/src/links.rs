use reqwest::Url;

use dispatch_logic::{Location, PaymentCode, prelude::*};

/// UPI deep link for `code`, this is what the payment QR code encodes
pub fn upi_payment_url(code: &PaymentCode) -> Result<Url> {
    let payee_name = if code.payee_name.trim().is_empty() {
        &code.payer_name
    } else {
        &code.payee_name
    };
    let amount = format!("{:.2}", code.amount);
    let note = format!("Order for {}", code.payer_name);

    Url::parse_with_params(
        "upi://pay",
        &[
            ("pa", code.payee_id.as_str()),
            ("pn", payee_name.as_str()),
            ("am", amount.as_str()),
            ("cu", "INR"),
            ("tn", note.as_str()),
        ],
    )
    .context("Failed to build payment link")
}

/// Link that opens turn-by-turn directions to `destination` in a maps app
pub fn directions_url(destination: Location) -> Result<Url> {
    let destination = format!("{},{}", destination.lat, destination.long);
    Url::parse_with_params(
        "https://www.google.com/maps/dir/",
        &[("api", "1"), ("destination", destination.as_str())],
    )
    .context("Failed to build directions link")
}

#[cfg(test)]
mod tests {
    use dispatch_logic::StopId;

    use super::*;

    fn code(payee_name: &str) -> PaymentCode {
        PaymentCode {
            payee_id: "9770123692@ptyes".to_string(),
            payee_name: payee_name.to_string(),
            amount: 150.0,
            payer_name: "Asha Devi".to_string(),
            target: StopId::new("9876543210"),
        }
    }

    #[test]
    fn test_upi_url() {
        let url = upi_payment_url(&code("Tanakpur Store")).expect("Failed to build");
        assert_eq!(url.scheme(), "upi");
        assert_eq!(
            url.as_str(),
            "upi://pay?pa=9770123692%40ptyes&pn=Tanakpur+Store&am=150.00&cu=INR&tn=Order+for+Asha+Devi"
        );
    }

    #[test]
    fn test_upi_url_without_store_name() {
        let url = upi_payment_url(&code("")).expect("Failed to build");
        let pn = url
            .query_pairs()
            .find(|(k, _)| k == "pn")
            .map(|(_, v)| v.into_owned());
        assert_eq!(pn.as_deref(), Some("Asha Devi"));
    }

    #[test]
    fn test_directions_url() {
        let url = directions_url(Location::new(29.07, 80.11)).expect("Failed to build");
        let destination = url
            .query_pairs()
            .find(|(k, _)| k == "destination")
            .map(|(_, v)| v.into_owned());
        assert_eq!(url.host_str(), Some("www.google.com"));
        assert_eq!(destination.as_deref(), Some("29.07,80.11"));
    }
}
