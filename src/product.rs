//! Registry of known JetBrains products

use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub name: &'static str,
    pub code: &'static str,
    pub binname: &'static str,
    /// Extra aliases; the code is always accepted too.
    aliases: &'static [&'static str],
}

impl Product {
    const fn new(
        name: &'static str,
        code: &'static str,
        binname: &'static str,
        aliases: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            code,
            binname,
            aliases,
        }
    }

    /// All aliases, ending with the product code.
    pub fn aliases(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.aliases.iter().copied().chain(std::iter::once(self.code))
    }
}

pub static PRODUCTS: &[Product] = &[
    Product::new("CLion", "CL", "clion", &[]),
    Product::new("IntelliJ-Ultimate", "IIU", "idea", &["ideaU", "idea"]),
    Product::new("IntelliJ-Community", "IIC", "idea", &["ideaC"]),
    Product::new("PyCharm-Professional", "PCP", "pycharm", &["pycharmP"]),
    Product::new("PyCharm-Community", "PCC", "pycharm", &["pycharmC"]),
    Product::new("WebStorm", "WS", "webstorm", &[]),
    Product::new("DataGrip", "DG", "datagrip", &[]),
    Product::new("PhpStorm", "PH", "phpstorm", &[]),
];

fn registry() -> &'static HashMap<String, &'static Product> {
    static REGISTRY: OnceLock<HashMap<String, &'static Product>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        for product in PRODUCTS {
            map.insert(product.name.to_lowercase(), product);
            for alias in product.aliases() {
                map.insert(alias.to_lowercase(), product);
            }
        }
        map
    })
}

/// Look up a product by name, alias or code, ignoring case.
pub fn lookup(name: &str) -> Option<&'static Product> {
    registry().get(&name.to_lowercase()).copied()
}

/// Help epilog listing every product with its aliases.
pub fn products_help() -> String {
    let mut res = String::from("Available products:");
    for product in PRODUCTS {
        let aliases: Vec<_> = product.aliases().collect();
        res.push_str(&format!(
            "\n  {:25} aliases: {}",
            product.name,
            aliases.join(" ")
        ));
    }
    res
}
