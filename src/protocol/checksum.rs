/// XOR of every byte in `data`. `checksum(&[]) == 0`.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc ^ b)
}
