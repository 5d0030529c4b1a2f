//! Static HTML page of affiliate links, one section per category.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::config::Settings;
use crate::model::{CategoryMap, Product};

const STYLE: &str = r#"
    * { margin: 0; padding: 0; box-sizing: border-box; }
    body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
           background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); min-height: 100vh; padding: 20px 0; }
    header { text-align: center; padding: 40px 20px; background: rgba(255, 255, 255, 0.95);
             margin: 0 20px 30px; border-radius: 20px; box-shadow: 0 8px 32px rgba(0, 0, 0, 0.1); }
    header h1 { font-size: 2.5rem; color: #2c3e50; margin-bottom: 10px; }
    header p { font-size: 1.1rem; color: #7f8c8d; max-width: 600px; margin: 0 auto; line-height: 1.6; }
    .category-section { margin: 0 20px 40px; background: rgba(255, 255, 255, 0.95); border-radius: 20px;
                        overflow: hidden; box-shadow: 0 8px 32px rgba(0, 0, 0, 0.1); }
    .category-header { background: linear-gradient(135deg, #3498db, #2980b9); color: white; padding: 20px 25px;
                       font-size: 1.4rem; font-weight: 600; text-transform: uppercase; letter-spacing: 1px; }
    .product-scroll-container { display: flex; overflow-x: auto; gap: 20px; padding: 25px; scroll-snap-type: x mandatory; }
    .product-card { flex: 0 0 auto; width: 220px; background: white; border-radius: 15px; overflow: hidden;
                    scroll-snap-align: start; transition: all 0.3s ease; box-shadow: 0 4px 15px rgba(0, 0, 0, 0.1); }
    .product-card:hover { transform: translateY(-8px); box-shadow: 0 12px 35px rgba(0, 0, 0, 0.15); }
    .product-card a { text-decoration: none; color: inherit; display: block; }
    .image-container { width: 100%; height: 200px; background: #f8f9fa; display: flex; align-items: center;
                       justify-content: center; overflow: hidden; }
    .image-container img { max-width: 90%; max-height: 90%; object-fit: contain; }
    .no-image { display: flex; align-items: center; justify-content: center; width: 90%; height: 90%;
                color: #999; font-size: 2.5rem; border: 2px dashed #ccc; border-radius: 8px; }
    .product-info { padding: 20px; }
    .product-info h3 { font-size: 0.95rem; line-height: 1.4; color: #2c3e50; min-height: 60px; overflow: hidden; }
    .price { margin-top: 10px; padding: 8px; background: linear-gradient(135deg, #27ae60, #2ecc71); color: white;
             text-align: center; border-radius: 6px; font-weight: 600; font-size: 0.9rem; }
    .price:empty::after { content: "Se pris på Amazon"; }
    @media (max-width: 768px) { .product-card { width: 180px; } header h1 { font-size: 2rem; } }
"#;

/// Build the whole page. Categories without products are left out.
pub fn render_page(products: &CategoryMap, settings: &Settings) -> String {
    let mut html = String::with_capacity(16 * 1024);
    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="sv">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Bästsäljare på Amazon Sverige</title>
    <meta name="description" content="Upptäck de populäraste produkterna på Amazon Sverige.">
    <style>{STYLE}</style>
</head>
<body>
    <header>
        <h1>Bästsäljare på Amazon</h1>
        <p>Våra populäraste produkter baserat på försäljning.</p>
    </header>
"#
    );

    for (category, items) in products.iter().filter(|(_, items)| !items.is_empty()) {
        let _ = write!(
            html,
            r#"    <section class="category-section">
        <div class="category-header">{}</div>
        <div class="product-scroll-container">
"#,
            encode_text(category)
        );
        for product in items {
            render_card(&mut html, product, settings);
        }
        html.push_str("        </div>\n    </section>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn render_card(html: &mut String, product: &Product, settings: &Settings) {
    let link = settings.affiliate_link(product.id.as_str());
    // A broken image swaps itself for the hidden placeholder next to it.
    let image = match &product.image_url {
        Some(src) => format!(
            r#"<img src="{}" alt="{}" loading="lazy" onerror="this.style.display='none'; this.nextElementSibling.style.display='flex';"><div class="no-image" style="display: none;">📦</div>"#,
            encode_double_quoted_attribute(src),
            encode_double_quoted_attribute(&product.title)
        ),
        None => r#"<div class="no-image">📦</div>"#.to_string(),
    };
    let _ = write!(
        html,
        r#"            <div class="product-card">
                <a href="{link}" target="_blank" rel="noopener sponsored">
                    <div class="image-container">{image}</div>
                    <div class="product-info">
                        <h3>{title}</h3>
                        <div class="price"></div>
                    </div>
                </a>
            </div>
"#,
        link = encode_double_quoted_attribute(&link),
        title = encode_text(&product.title),
    );
}

/// Render and write the page to `path`.
pub fn write_page(products: &CategoryMap, settings: &Settings, path: &Path) -> io::Result<()> {
    fs::write(path, render_page(products, settings))
}
