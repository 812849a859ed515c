//! JavaScript evaluated in the page to pull structured data out of the DOM.
//!
//! All scripts are IIFEs returning JSON-serializable values; absence of an
//! element yields null/empty rather than throwing, so the Rust side can
//! treat every miss as a defined default.

/// Raw JSON-LD payload of the first structured-metadata block, or null.
pub const JSON_LD_SCRIPT: &str = r#"
    (() => {
        const script = document.querySelector('script[type="application/ld+json"]');
        return script ? script.textContent : null;
    })()
"#;

/// Paywall indicator probes. Presence of the preview container marks
/// member-only content; the upsell banner marks paid content.
pub const PAYWALL_SCRIPT: &str = r#"
    (() => ({
        preview: document.querySelector('div[aria-label="Post Preview"]') !== null,
        upsell: document.querySelector('div.paywall-upsell-container') !== null
    }))()
"#;

/// Full body text. Prefers the platform's selectable-paragraph markers and
/// falls back to plain article paragraphs; empty string when neither exists.
pub const BODY_TEXT_SCRIPT: &str = r#"
    (() => {
        let paragraphs = document.querySelectorAll('article p[data-selectable-paragraph]');
        if (paragraphs.length === 0) {
            paragraphs = document.querySelectorAll('article p');
        }
        return Array.from(paragraphs)
            .map(p => p.innerText)
            .filter(t => t && t.length > 0)
            .join('\n');
    })()
"#;

/// Clap count exactly as displayed (abbreviated), or null.
pub const CLAPS_SCRIPT: &str = r#"
    (() => {
        const el = document.querySelector('div.pw-multi-vote-count p');
        return el ? el.innerText : null;
    })()
"#;

/// Tag names from the article's tag links.
pub const TAGS_SCRIPT: &str = r#"
    (() => Array.from(document.querySelectorAll('a[href*="/tag/"]'))
        .map(a => a.innerText.trim())
        .filter(t => t.length > 0))()
"#;

/// Click the "see all responses" control. Retries a couple of times because
/// the button mounts late on slow connections. Resolves to whether a click
/// landed.
pub const OPEN_RESPONSES_SCRIPT: &str = r#"
    (() => {
        const clickButton = () => {
            const button = document.querySelector('button[aria-label="responses"]');
            if (button) {
                button.click();
                return true;
            }
            return false;
        };
        if (clickButton()) return true;
        return new Promise((resolve) => {
            setTimeout(() => {
                if (clickButton()) resolve(true);
                else setTimeout(() => resolve(clickButton()), 1000);
            }, 1000);
        });
    })()
"#;

/// Scroll the responses dialog towards its end to trigger lazy loading.
pub const RESPONSES_SCROLL_SCRIPT: &str = r#"
    (() => {
        const dialog = document.querySelector('div[role="dialog"]');
        if (dialog && dialog.lastElementChild && dialog.lastElementChild.firstElementChild) {
            dialog.lastElementChild.firstElementChild.scrollBy(0, 20000);
            return true;
        }
        return false;
    })()
"#;

/// Parse every loaded response node into a plain object. A blockquote inside
/// a response is the quoted-excerpt marker for `referencesArticle`.
pub const COMMENTS_SCRIPT: &str = r#"
    (() => {
        const dialog = document.querySelector('div[role="dialog"]');
        if (!dialog) return [];
        const nodes = dialog.querySelectorAll('div[data-testid="response"], article');
        return Array.from(nodes).map(node => {
            const profile = node.querySelector('a[href*="/@"]');
            const firstParagraph = node.querySelector('p');
            const votes = node.querySelector('div.pw-multi-vote-count p');
            return {
                username: profile ? profile.innerText.trim() : null,
                text: firstParagraph ? firstParagraph.innerText : null,
                fullText: node.innerText || '',
                claps: votes ? votes.innerText : '0',
                referencesArticle: node.querySelector('blockquote') !== null
            };
        }).filter(c => c.fullText.length > 0);
    })()
"#;
