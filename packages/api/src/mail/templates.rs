use crate::{entity::contact_message, export::pdf::escape_html};

/// Subject, HTML and plain-text bodies for the inbox notification of a new
/// contact form message.
pub fn contact_notification(message: &contact_message::Model) -> (String, String, String) {
    let subject = format!("[CorestoneGrader] Contact: {}", message.subject);

    let html = format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>New contact message</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; background-color: #f3f4f6; color: #1f2937;">
    <table role="presentation" style="width: 100%; border-collapse: collapse;">
        <tr>
            <td style="padding: 32px 16px;">
                <table role="presentation" style="max-width: 600px; margin: 0 auto; background: #ffffff; border-radius: 12px; border: 1px solid #e5e7eb;">
                    <tr>
                        <td style="padding: 24px 32px; border-bottom: 1px solid #e5e7eb;">
                            <span style="font-size: 20px; font-weight: 700; color: #4f46e5;">CorestoneGrader</span>
                            <h1 style="margin: 8px 0 0; font-size: 20px;">New contact message #{id}</h1>
                        </td>
                    </tr>
                    <tr>
                        <td style="padding: 24px 32px; font-size: 14px; line-height: 1.6;">
                            <p style="margin: 0 0 8px;"><strong>From:</strong> {name} &lt;{email}&gt;</p>
                            <p style="margin: 0 0 16px;"><strong>Subject:</strong> {subject}</p>
                            <div style="background: #f9fafb; border-radius: 8px; padding: 16px; white-space: pre-wrap;">{body}</div>
                        </td>
                    </tr>
                </table>
            </td>
        </tr>
    </table>
</body>
</html>"##,
        id = message.id,
        name = escape_html(&message.name),
        email = escape_html(&message.email),
        subject = escape_html(&message.subject),
        body = escape_html(&message.message),
    );

    let text = format!(
        "New contact message #{}\n\nFrom: {} <{}>\nSubject: {}\n\n{}\n",
        message.id, message.name, message.email, message.subject, message.message
    );

    (subject, html, text)
}
