//! 최소 송금 정산
//!
//! 플레이어별 점수를 채권자(+)와 채무자(-)로 나누고 두 커서로 순서대로
//! 맞춰 나가면서 송금 목록을 만든다. 입력 순서가 같으면 결과도 같다.

use super::model::UserId;
use thiserror::Error;

/// 정산 입력: 한 플레이어의 현재 점수
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    pub user_id: UserId,
    pub score: i64,
}

/// 정산 결과: 채무자 → 채권자 송금
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payment {
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub amount: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettlementError {
    /// 점수 합이 0 이 아님 (다른 곳의 버그)
    #[error("balances do not net to zero (residual {0})")]
    Unbalanced(i128),
}

/// 송금 횟수가 최소가 되도록 정산한다.
///
/// 점수가 0 인 플레이어는 제외되고, 결과는 최대 `채권자 + 채무자 - 1` 건이다.
pub fn settle(balances: &[Balance]) -> Result<Vec<Payment>, SettlementError> {
    let residual: i128 = balances.iter().map(|b| i128::from(b.score)).sum();
    if residual != 0 {
        return Err(SettlementError::Unbalanced(residual));
    }

    let mut creditors: Vec<Balance> = balances
        .iter()
        .filter(|b| b.score > 0)
        .copied()
        .collect();
    let mut debtors: Vec<Balance> = balances
        .iter()
        .filter(|b| b.score < 0)
        .copied()
        .collect();

    let mut payments = Vec::with_capacity((creditors.len() + debtors.len()).saturating_sub(1));
    let (mut c, mut d) = (0, 0);

    while c < creditors.len() && d < debtors.len() {
        let creditor = &mut creditors[c];
        let debtor = &mut debtors[d];

        // 채무가 i64::MIN 이면 부호를 바꿀 수 없으므로 절댓값으로 비교
        let amount = match i64::try_from(debtor.score.unsigned_abs()) {
            Ok(owed) => creditor.score.min(owed),
            Err(_) => creditor.score,
        };
        payments.push(Payment {
            from_user_id: debtor.user_id,
            to_user_id: creditor.user_id,
            amount,
        });

        creditor.score -= amount;
        debtor.score += amount;

        if creditor.score == 0 {
            c += 1;
        }
        if debtor.score == 0 {
            d += 1;
        }
    }

    // 합이 0 이면 양쪽이 동시에 끝난다
    debug_assert!(c == creditors.len() && d == debtors.len());

    Ok(payments)
}
