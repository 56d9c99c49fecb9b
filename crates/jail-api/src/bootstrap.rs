//! Script run into every cell between the configured base script and the
//! user script.

pub const CATALOG_EXPORT: &str = "_status_catalog";
pub const CATALOG_BINDING: &str = "catalog";
/// Entry point `invoke` calls with `(function_path, args_json)`. Either a
/// script `fn` or a closure bound under this name.
pub const DISPATCH_EXPORT: &str = "dispatch";

/// Client helpers over the `jeth` bridge plus the `bn` decimal helper.
pub const PRELUDE: &str = r#"
fn bn(value) {
    switch type_of(value) {
        "decimal" => value,
        "string" => parse_decimal(value),
        _ => to_decimal(value)
    }
}

fn web3_request(method, params) {
    let response = jeth::send(#{
        jsonrpc: "2.0",
        id: jeth::next_id(),
        method: method,
        params: params
    });
    if response.contains("error") {
        throw response.error;
    }
    response.result
}

fn web3_request_async(method, params, callback) {
    jeth::sendAsync(#{
        jsonrpc: "2.0",
        id: jeth::next_id(),
        method: method,
        params: params
    }, callback)
}

let web3 = #{
    request: Fn("web3_request"),
    requestAsync: Fn("web3_request_async")
};
"#;

/// Appends the statement that serializes the catalog export into `catalog`.
pub fn with_catalog_trailer(source: &str) -> String {
    format!(
        "{}\n;\nlet {} = JSON::stringify({});\n",
        source, CATALOG_BINDING, CATALOG_EXPORT
    )
}
