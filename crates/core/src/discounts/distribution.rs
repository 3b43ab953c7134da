use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::discounts::money;
use crate::domain::cart::Cart;
use crate::domain::product::ProductId;

/// New unit price for one cart line after a cart-level discount is spread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemAdjustment {
    pub product_id: ProductId,
    pub original_unit_price: Decimal,
    pub discounted_unit_price: Decimal,
    pub line_discount: Decimal,
    pub labels: Vec<String>,
}

/// Spreads `total_discount` across lines in proportion to each line's share of
/// the subtotal, then converts it into a per-unit price.
///
/// The discount is clamped to `0..=subtotal`; unit prices are rounded to cents
/// and stay within `0..=original_price`. Rounding residue carries into the next
/// line, so the summed `line_discount` is what the cart will actually show. A
/// zero discount yields adjustments that restore original prices.
pub fn distribute(cart: &Cart, total_discount: Decimal, labels: &[String]) -> Vec<ItemAdjustment> {
    let subtotal = cart.subtotal();
    let total_discount = total_discount.max(Decimal::ZERO).min(subtotal);
    let discounting = subtotal > Decimal::ZERO && total_discount > Decimal::ZERO;
    let mut carried = Decimal::ZERO;

    cart.items
        .iter()
        .map(|item| {
            let original = item.original_price;
            if !discounting || item.quantity == 0 {
                return ItemAdjustment {
                    product_id: item.product_id.clone(),
                    original_unit_price: original,
                    discounted_unit_price: original,
                    line_discount: Decimal::ZERO,
                    labels: Vec::new(),
                };
            }

            let quantity = Decimal::from(item.quantity);
            let target = total_discount * item.line_subtotal() / subtotal + carried;
            let unit_price =
                money(original - target / quantity).max(Decimal::ZERO).min(original);
            let line_discount = (original - unit_price) * quantity;
            carried = target - line_discount;
            ItemAdjustment {
                product_id: item.product_id.clone(),
                original_unit_price: original,
                discounted_unit_price: unit_price,
                line_discount,
                labels: labels.to_vec(),
            }
        })
        .collect()
}

/// Sum of the per-line discounts an adjustment set writes onto the cart.
pub fn distributed_total(adjustments: &[ItemAdjustment]) -> Decimal {
    adjustments.iter().map(|adjustment| adjustment.line_discount).sum()
}

/// Writes adjustments back onto matching cart lines. Unknown products are skipped.
pub fn apply_adjustments(cart: &mut Cart, adjustments: &[ItemAdjustment]) {
    for adjustment in adjustments {
        if let Some(item) =
            cart.items.iter_mut().find(|item| item.product_id == adjustment.product_id)
        {
            item.set_discounted_price(adjustment.discounted_unit_price, adjustment.labels.clone());
        }
    }
}
