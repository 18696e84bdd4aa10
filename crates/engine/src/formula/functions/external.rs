// Functions whose values are supplied by the host

use super::{try_value, FunctionDefinition, FunctionRegistry, ParamType};
use crate::formula::value::EvalResult;

/// Cache key for a currency pair, e.g. `currency:EUR:USD`.
pub fn currency_rate_key(from: &str, to: &str) -> String {
    format!("currency:{}:{}", from.trim().to_uppercase(), to.trim().to_uppercase())
}

pub(super) fn register(r: &mut FunctionRegistry) {
    r.register(FunctionDefinition::fixed(
        "CURRENCY.RATE",
        vec![ParamType::Text, ParamType::Text],
        |args, env| {
            let from = try_value!(args[0].text());
            let to = try_value!(args[1].text());
            if from.trim().eq_ignore_ascii_case(to.trim()) {
                return EvalResult::from(1.0);
            }
            EvalResult::from(env.external.request(&currency_rate_key(&from, &to), env.cell))
        },
    ));
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::formula::value::{ErrorKind, Value};

    #[test]
    fn test_currency_rate_is_loading_until_resolved() {
        let v = scalar(call("CURRENCY.RATE", vec![t("eur"), t("USD")]));
        assert_eq!(v.as_error().map(|e| e.kind), Some(ErrorKind::Loading));
        assert_eq!(currency_rate_key("eur", " usd"), "currency:EUR:USD");
    }

    #[test]
    fn test_same_currency_is_one() {
        assert_eq!(scalar(call("CURRENCY.RATE", vec![t("EUR"), t("eur")])), Value::Number(1.0));
    }
}
