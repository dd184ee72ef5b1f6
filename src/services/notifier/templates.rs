use crate::models::payment::PaymentRecord;

pub fn payer_confirmation(record: &PaymentRecord, currency: &str) -> (String, String) {
    let subject = "Payment Received Confirmation - IMF Africa Pay".to_string();
    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2 style="color: #2563eb;">Payment Received Confirmation</h2>
  <p>Dear {name},</p>
  <p>Thank you for your payment. We have received your transfer receipt with the following details:</p>
  {details}
  {receipt_note}
  <p>We will process your payment shortly. If you have any questions, please contact our support team.</p>
  <hr style="margin: 30px 0;">
  <p style="color: #64748b; font-size: 14px;">Best regards,<br><strong>IMF Africa Pay Team</strong></p>
</div>"#,
        name = escape_html(&record.name),
        details = details_block(record, currency, false),
        receipt_note = if record.has_receipt() {
            "<p>Your payment receipt is attached to this email for your records.</p>"
        } else {
            ""
        },
    );
    (subject, html)
}

pub fn admin_alert(record: &PaymentRecord, currency: &str) -> (String, String) {
    let subject = format!("New Payment Received - {}", record.reference);
    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2 style="color: #2563eb;">New Payment Received</h2>
  <p>A new payment receipt has been submitted:</p>
  {details}
  {receipt_note}
</div>"#,
        details = details_block(record, currency, true),
        receipt_note = if record.has_receipt() {
            "<p>Payment receipt is attached for verification.</p>"
        } else {
            "<p>No receipt was uploaded with this payment.</p>"
        },
    );
    (subject, html)
}

fn details_block(record: &PaymentRecord, currency: &str, include_payer: bool) -> String {
    let mut rows = vec![format!(
        "<p><strong>Reference:</strong> {}</p>",
        escape_html(&record.reference)
    )];
    if include_payer {
        rows.push(format!("<p><strong>Payer Name:</strong> {}</p>", escape_html(&record.name)));
        rows.push(format!("<p><strong>Payer Email:</strong> {}</p>", escape_html(&record.email)));
    }
    rows.push(format!(
        "<p><strong>Service:</strong> {}</p>",
        escape_html(&record.service_type)
    ));
    rows.push(format!(
        "<p><strong>Amount:</strong> {}{}</p>",
        escape_html(currency),
        format_amount(record.amount)
    ));
    rows.push(format!(
        "<p><strong>Date:</strong> {}</p>",
        record.timestamp.format("%B %-d, %Y")
    ));
    rows.push(format!(
        "<p><strong>Time:</strong> {}</p>",
        record.timestamp.format("%H:%M:%S UTC")
    ));

    format!(
        r#"<div style="background-color: #f1f5f9; padding: 15px; border-radius: 8px; margin: 20px 0;">
    <h3>Payment Details</h3>
    {}
  </div>"#,
        rows.join("\n    ")
    )
}

/// `1234567.5` -> `1,234,567.50`
pub fn format_amount(amount: f64) -> String {
    let fixed = format!("{:.2}", amount);
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let (sign, digits) = match whole.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", whole),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}{}.{}", sign, grouped, fraction)
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
